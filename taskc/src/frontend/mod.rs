//! Parsing of the C subset, including a scanner (tokenizer) and the
//! `#pragma omp` annotations.

mod expression;
mod parser;
mod pragma;
mod scanner;
mod token;

pub use parser::Parser;
pub use scanner::Scanner;
pub use token::Location;
pub use token::Token;
pub use token::TokenKind;
