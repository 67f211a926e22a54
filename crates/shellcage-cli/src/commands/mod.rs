pub mod classify;
pub mod completions;
pub mod profile;
pub mod run;
pub mod wrap;
