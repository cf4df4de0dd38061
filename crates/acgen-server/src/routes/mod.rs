pub mod generate;
pub mod jira;
pub mod system;
