//! The request pipeline: preprocessing that runs before any language front
//! end sees the text (spec §2 "Control flow of a typical request").

pub mod preprocessors;
