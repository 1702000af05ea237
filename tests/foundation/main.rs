//! Integration tests for Layer 0: Foundation
//!
//! Tests for attribute keys, the key registry, particle indices and errors.
