use std::fmt;

use serde::{Deserialize, Serialize};

/// Одна запись ответа: ключ + поля в исходном порядке, без интерпретации.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub fields: Vec<String>,
}

impl Record {
    /// Поле по индексу; отсутствующее = пустая строка
    pub fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Обязательное числовое поле: пусто или мусор -> 0
    pub fn number(&self, idx: usize) -> f64 {
        safe_number(self.field(idx))
    }

    /// Необязательное числовое поле: пусто или мусор -> None
    pub fn number_opt(&self, idx: usize) -> Option<f64> {
        safe_number_opt(self.field(idx))
    }

    /// Апстрим отвечает `v_xxx=""` на неизвестный код
    pub fn is_empty(&self) -> bool {
        self.field(0).is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.fields.join("~"))
    }
}

pub fn safe_number(raw: &str) -> f64 {
    safe_number_opt(raw).unwrap_or(0.0)
}

/// Как `parseFloat`: берётся самое длинное числовое начало строки,
/// хвост игнорируется (`"10.5%"` -> 10.5).
pub fn safe_number_opt(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    numeric_prefix(s)
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|n| !n.is_nan())
}

// [+-] digits [. digits] [e [+-] digits] | [+-] Infinity
fn numeric_prefix(s: &str) -> Option<&str> {
    let b = s.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return Some(&s[..i + "Infinity".len()]);
    }

    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < b.len() && b[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }

    // экспонента засчитывается, только если после неё есть цифры
    if i < b.len() && matches!(b[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < b.len() && matches!(b[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(&s[..i])
}
