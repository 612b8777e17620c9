pub mod jobs;
pub mod prompts;
pub mod requests;
pub mod styles;
