//! Markdown import tests, through both stages.

mod import;
