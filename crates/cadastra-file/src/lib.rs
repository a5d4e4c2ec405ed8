//! Cadastra 文件格式
//!
//! 编辑日志的保存、读取和重放。日志只保存编辑输入，要素几何在加载时
//! 重新计算。

pub mod error;
pub mod journal;

pub use error::JournalError;
pub use journal::{load, save, Journal, JournalEdit, JournalSession};
