//! Word-processing package tests: import through both stages, and export.

mod export;
mod import;
