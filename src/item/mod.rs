/// This module provides the CSV tokenizer, row source and record reader.
pub mod csv;
