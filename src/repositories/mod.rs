pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod questions;
pub(crate) mod subjects;
pub(crate) mod users;
