//! Test suites for host bootstrap and guest serving.

mod support;
