//! LaTeX import tests, through both stages.

mod import;
