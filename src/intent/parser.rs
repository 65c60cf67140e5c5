//! `KEY: VALUE` 意图文本解析
//!
//! 识别 TASK / GOAL / CONSTRAINTS / OUTPUT（大小写不敏感），其它键忽略；空行与 `#` 注释跳过。
//! CONSTRAINTS 可出现多次，每个值再按 `;` 拆分。

use std::path::Path;

use crate::intent::{Intent, IntentError};

pub fn parse_intent(text: &str) -> Result<Intent, IntentError> {
    let mut task: Option<String> = None;
    let mut goal: Option<String> = None;
    let mut output: Option<String> = None;
    let mut constraints: Vec<String> = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(|| IntentError::Malformed {
            line_number: idx + 1,
            line: raw_line.to_string(),
        })?;
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.trim().to_lowercase().as_str() {
            "task" => task = Some(value.to_string()),
            "goal" => goal = Some(value.to_string()),
            "output" => output = Some(value.to_string()),
            "constraints" => constraints.extend(
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from),
            ),
            other => tracing::debug!(key = %other, "ignoring unknown intent key"),
        }
    }

    let missing: Vec<String> = [("task", &task), ("goal", &goal)]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IntentError::MissingFields(missing));
    }

    let mut intent = Intent::new(task.unwrap_or_default(), goal.unwrap_or_default())?
        .with_constraints(constraints);
    if let Some(expected) = output {
        intent = intent.with_expected_output(expected);
    }
    Ok(intent)
}

pub fn parse_intent_file(path: impl AsRef<Path>) -> Result<Intent, IntentError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| IntentError::Io(format!("{}: {}", path.display(), e)))?;
    parse_intent(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_intent() {
        let text = "# factorial job\n\
                    TASK: compute factorial\n\
                    GOAL: factorial of 5\n\
                    CONSTRAINTS: integers only; no network\n\
                    constraints: finish quickly\n\
                    OUTPUT: 120\n";
        let intent = parse_intent(text).unwrap();
        assert_eq!(intent.task(), "compute factorial");
        assert_eq!(intent.goal(), "factorial of 5");
        assert_eq!(
            intent.constraints(),
            &["integers only", "no network", "finish quickly"]
        );
        assert_eq!(intent.expected_output(), Some("120"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let intent = parse_intent("TASK: a\nPRIORITY: high\nGOAL: b").unwrap();
        assert_eq!(intent.goal(), "b");
        assert!(intent.constraints().is_empty());
    }

    #[test]
    fn test_value_may_contain_colons() {
        let intent = parse_intent("TASK: fetch http://example.com\nGOAL: status: 200").unwrap();
        assert_eq!(intent.task(), "fetch http://example.com");
        assert_eq!(intent.goal(), "status: 200");
    }

    #[test]
    fn test_line_without_separator_is_malformed() {
        let err = parse_intent("TASK: a\nthis line is wrong\nGOAL: b").unwrap_err();
        assert_eq!(
            err,
            IntentError::Malformed {
                line_number: 2,
                line: "this line is wrong".to_string()
            }
        );
    }

    #[test]
    fn test_missing_goal() {
        let err = parse_intent("TASK: a\nGOAL:   ").unwrap_err();
        assert_eq!(err, IntentError::MissingFields(vec!["goal".to_string()]));
    }

    #[test]
    fn test_parse_intent_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TASK: t\nGOAL: g").unwrap();
        let intent = parse_intent_file(file.path()).unwrap();
        assert_eq!(intent.task(), "t");
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_intent_file("/definitely/not/here.intent").unwrap_err();
        assert!(matches!(err, IntentError::Io(_)));
    }
}
