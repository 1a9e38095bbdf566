use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Чтение кодов бумаг (`sh600000`, `sz000858`, `jj000001`, ...) по одному на строку
pub fn read_codes<R: io::Read>(reader: R) -> io::Result<Vec<String>> {
    let mut set = BTreeSet::new();
    let buf = BufReader::new(reader);

    for line in buf.lines() {
        let line = line?;
        if let Some(c) = normalize_line(&line) {
            set.insert(c);
        }
    }

    Ok(set.into_iter().collect())
}

/// Чтение кодов из файла
pub fn read_codes_from_path(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let f = File::open(path)?;
    read_codes(f)
}

fn normalize_line(line: &str) -> Option<String> {
    // Поддержка inline-комментариев: "sh600000 # ПАО"
    let s = line.split('#').next().unwrap_or("").trim();
    if s.is_empty() {
        return None;
    }

    Some(normalize_code(s))
}

/// Префикс рынка у апстрима в нижнем регистре, а вот тикеры США
/// (`usAAPL`) регистрозависимы - их не трогаем.
fn normalize_code(code: &str) -> String {
    let lower = code.to_ascii_lowercase();
    if lower.starts_with("us") || lower.starts_with("s_us") {
        let split = if lower.starts_with("s_us") { 4 } else { 2 };
        format!("{}{}", &lower[..split], &code[split..])
    } else {
        lower
    }
}

/// Парсит список кодов из строки вида "sh600000, SZ000858, ,sh600000".
/// Правила:
/// - разделитель: запятая
/// - trim пробелов, пустые элементы игнорируются
/// - префикс рынка в нижний регистр
/// - результат отсортирован и уникален
pub fn parse_codes_csv(raw: &str) -> Vec<String> {
    let mut set = BTreeSet::new();

    for part in raw.split(',') {
        let c = part.trim();
        if c.is_empty() {
            continue;
        }
        set.insert(normalize_code(c));
    }

    set.into_iter().collect()
}

/// Разбить коды на пачки по `size` (последняя может быть короче).
/// `size == 0` трактуется как 1.
pub fn chunk_codes(codes: &[String], size: usize) -> Vec<Vec<String>> {
    codes.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}
