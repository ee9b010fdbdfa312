//! Tests for bundle assembly.
