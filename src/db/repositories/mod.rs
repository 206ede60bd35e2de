pub mod exams;
pub mod identities;
pub mod results;
