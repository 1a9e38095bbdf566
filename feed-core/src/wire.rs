//! Текстовый протокол котировок.
//!
//! Тело ответа приходит в GBK. После декодирования это последовательность
//! выражений через `;`:
//!
//! ```text
//! stmt (';' stmt)*
//! stmt := name '=' ['"'] v1 ('~' v2)* ['"']
//! ```
//!
//! Префикс `v_` у имени отрезается. Поля никак не интерпретируются,
//! числа/даты - забота слоя маппинга.

use std::borrow::Cow;

use encoding_rs::GBK;

use crate::types::Record;

/// Префикс имени переменной в ответе
pub const KEY_PREFIX: &str = "v_";

pub const STATEMENT_SEPARATOR: char = ';';
pub const FIELD_SEPARATOR: char = '~';

/// Декодировать тело ответа из GBK.
///
/// Невалидные последовательности заменяются на U+FFFD, ошибок нет.
pub fn decode_gbk(bytes: &[u8]) -> Cow<'_, str> {
    GBK.decode_without_bom_handling(bytes).0
}

/// Разобрать текст ответа в записи, сохраняя порядок.
///
/// Выражения без `=` и пустые выражения пропускаются.
pub fn parse_response(text: &str) -> Vec<Record> {
    text.split(STATEMENT_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(parse_statement)
        .collect()
}

/// Декодировать + разобрать за один шаг
pub fn decode(bytes: &[u8]) -> Vec<Record> {
    parse_response(&decode_gbk(bytes))
}

fn parse_statement(stmt: &str) -> Option<Record> {
    let (name, raw) = stmt.split_once('=')?;

    let name = name.trim();
    let key = name.strip_prefix(KEY_PREFIX).unwrap_or(name);

    let raw = raw.trim();
    // одиночная `"` (обрезанный ответ) = пустое значение
    let raw = if raw.starts_with('"') && raw.ends_with('"') {
        raw.get(1..raw.len().saturating_sub(1)).unwrap_or("")
    } else {
        raw
    };

    let fields = raw.split(FIELD_SEPARATOR).map(str::to_string).collect();

    Some(Record {
        key: key.to_string(),
        fields,
    })
}
