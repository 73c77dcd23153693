//! Behaviour tests for the weather plugin.
