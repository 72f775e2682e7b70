//! Tolerant ingestion of generated quiz-bank markup.
//!
//! Quiz banks arrive as XML-ish text from an upstream generator, often with
//! prose wrapping, missing end tags, or stray markup characters. The parser
//! recovers what it can, validates each item independently (exactly five
//! options numbered 1-5, option 1 the correct answer), and emits records in
//! a fixed column schema. A separate enhancement pass overlays difficulty,
//! time, tag, and chapter metadata without touching row count or order.
//!
//! Diagnostics are returned alongside the records; nothing is logged from
//! the library itself.

pub mod enhance;
pub mod parser;
pub mod records;

pub use enhance::{enhance, EnhanceOptions};
pub use parser::{parse_quiz_bank, OptionalFields, ParseOptions, ParseOutcome};
pub use records::{Difficulty, EnhancedRecord, QuizRecord};
