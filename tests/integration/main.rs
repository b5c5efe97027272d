//! Integration tests: the full scan loop against in-memory collaborators.

mod scan_cycle;
