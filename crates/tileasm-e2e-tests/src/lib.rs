//! Scenario tests live under `tests/`.
