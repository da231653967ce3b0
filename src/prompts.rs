//! Prompt text for SQL generation.
//!
//! Price sheets processed by this tool are Russian, so the instructions and
//! few-shot examples are too. Callers can replace both through
//! [`crate::config::Pdf2SqlConfig::system_prompt`] and
//! [`crate::config::Pdf2SqlConfig::few_shots`].
//!
//! The user prompt is laid out as: schema, task, few-shot examples,
//! recognised text, and a trailing `SQL:` cue the model continues from.

use crate::schema::DatabaseSchema;

/// Default system prompt: who the model is and what it must produce.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты — система, которая получает текст со страницы PDF \
и должна на основе него сформировать корректный SQL-запрос согласно схеме.";

/// Built-in few-shot examples for the `call_data` price table.
pub const DEFAULT_FEW_SHOTS: &str = r#"Пример 1.
Текст: ["3A", "11,13", "Южный федеральный округ", "01.11.2025"]
Схема таблицы call_data: id: INTEGER
    category_name: INTEGER
    district_name: TEXT
    call_date: DATE
    price: FLOAT

SQL: INSERT INTO call_data (category_name, district_name, price, call_date)
    VALUES ("3А", "Южный федеральный округ", "11.13", "01.11.2025");

Пример 2.
Текст: ["12A", "10,67", "Центральный федеральный округ", "01.11.2025", "Алюминий электротех", "177,5"]
Схема таблицы call_data: id: INTEGER
    category_name: INTEGER
    district_name: TEXT
    call_date: DATE
    price: FLOAT

SQL: INSERT INTO call_data (category_name, district_name, price, call_date)
    VALUES ("12А", "Центральный федеральный округ", "10.67", "01.11.2025"),
    ("Алюминий электротех", "Центральный федеральный округ", "177.5", "01.11.2025");"#;

/// Marker the prompt ends with and the model's answer is cut at.
pub const SQL_CUE: &str = "SQL:";

/// Task description for the first table of the schema.
pub fn task_instructions(table: &str) -> String {
    format!(
        "Найди в тексте категорию лома, цену, дату, регион.\n\
Свяжи их с таблицей {table}.\n\
\n\
Если региона нет — подставь NULL.\n\
\n\
Генерируй только SQL, без комментариев."
    )
}

/// Assemble the user prompt.
///
/// `ocr_text` is every recognised line of every page, joined with `\n`.
pub fn build_prompt(schema: &DatabaseSchema, few_shots: &str, ocr_text: &str) -> String {
    let table = schema.table_names().next().unwrap_or("call_data");
    format!(
        "Схема базы данных:\n{schema}\n{task}\n\n\
--- Few-shot Examples ---\n{few_shots}\n\n\
--- TEXT INPUT ---\n{ocr_text}\n\n\
{cue}\n",
        schema = schema.to_prompt_text(),
        task = task_instructions(table),
        cue = SQL_CUE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::from_yaml_str("call_data:\n  id: INTEGER\n  price: FLOAT\n", "config.yml")
            .unwrap()
    }

    #[test]
    fn prompt_sections_in_order() {
        let prompt = build_prompt(&schema(), DEFAULT_FEW_SHOTS, "3A\n11,13");
        let positions: Vec<usize> = [
            "Схема базы данных:",
            "price: FLOAT",
            "Свяжи их с таблицей call_data",
            "--- Few-shot Examples ---",
            "Пример 2.",
            "--- TEXT INPUT ---",
            "3A\n11,13",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{prompt}");
        assert!(prompt.trim_end().ends_with(SQL_CUE));
    }

    #[test]
    fn task_names_target_table() {
        let text = task_instructions("prices");
        assert!(text.contains("таблицей prices"));
        assert!(text.contains("NULL"));
    }

    #[test]
    fn few_shot_sql_is_balanced() {
        let opens = DEFAULT_FEW_SHOTS.matches('(').count();
        let closes = DEFAULT_FEW_SHOTS.matches(')').count();
        assert_eq!(opens, closes);
    }
}
