pub mod exam;
pub mod identity;
pub mod result;

pub use exam::{AnswerOption, Exam, ExamDraft, OptionDraft, Question, QuestionDraft};
pub use identity::{Identity, Role};
pub use result::{ExamResult, ResultDraft};
