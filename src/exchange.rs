use crate::calc::{
    category_average, final_grade, format_final_grade, format_grade, get_grade, weight_percent,
};
use crate::model::{SchoolClass, Subject};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Serialize)]
struct ExportDocument<'a> {
    classes: &'a [SchoolClass],
}

pub fn export_json(classes: &[SchoolClass]) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&ExportDocument { classes }).context("failed to serialize classes")
}

pub fn write_json(path: &Path, classes: &[SchoolClass]) -> anyhow::Result<()> {
    let text = export_json(classes)?;
    write_file(path, text.as_bytes())
}

/// Reason an import document was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRejected {
    pub code: &'static str,
    pub message: String,
}

impl ImportRejected {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Accepts `{ "classes": [...] }`; anything else is rejected before it can
/// reach the store.
pub fn parse_import_document(text: &str) -> Result<Vec<SchoolClass>, ImportRejected> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let doc: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ImportRejected::new("bad_json", e.to_string()))?;
    let Some(classes) = doc.get("classes") else {
        return Err(ImportRejected::new(
            "bad_format",
            "document has no \"classes\" field",
        ));
    };
    if !classes.is_array() {
        return Err(ImportRejected::new(
            "bad_format",
            "\"classes\" must be a list",
        ));
    }
    serde_json::from_value(classes.clone())
        .map_err(|e| ImportRejected::new("bad_format", e.to_string()))
}

/// Grade table for one subject, `;`-separated with a UTF-8 byte-order mark.
///
/// Row 1 names each exam's category with its share of the final grade and
/// the average/final columns, row 2 the exam names, then one row per
/// student.
pub fn subject_csv(class: &SchoolClass, subject: &Subject) -> anyhow::Result<Vec<u8>> {
    let category_total: f64 = subject.categories.iter().map(|c| c.weight).sum();

    let mut header1 = vec!["Schüler".to_string()];
    let mut header2 = vec![String::new()];
    for c in &subject.categories {
        let label = format!("{} ({}%)", c.name, weight_percent(c.weight, category_total));
        for e in subject.exams_in(&c.id) {
            header1.push(label.clone());
            header2.push(e.name.clone());
        }
        header1.push(format!("Ø {}", c.name));
        header2.push(String::new());
    }
    header1.push("Gesamtnote".to_string());
    header1.push("Tendenz".to_string());
    header2.push(String::new());
    header2.push(String::new());

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_writer(UTF8_BOM.to_vec());
    writer.write_record(&header1)?;
    writer.write_record(&header2)?;

    for s in &class.students {
        let mut row = vec![s.display_name()];
        for c in &subject.categories {
            for e in subject.exams_in(&c.id) {
                row.push(format_grade(get_grade(&subject.grades, &s.id, &e.id)));
            }
            row.push(format_grade(category_average(subject, &s.id, &c.id)));
        }
        let final_value = final_grade(subject, &s.id);
        row.push(format_grade(final_value));
        row.push(format_final_grade(final_value));
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to finish csv: {}", e.error()))
}

pub fn write_subject_csv(path: &Path, class: &SchoolClass, subject: &Subject) -> anyhow::Result<usize> {
    let bytes = subject_csv(class, subject)?;
    write_file(path, &bytes)?;
    Ok(class.students.len())
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Exam, Grade, Student};

    fn sample() -> SchoolClass {
        SchoolClass {
            id: "c".into(),
            name: "5a".into(),
            students: vec![
                Student {
                    id: "s1".into(),
                    first_name: "Max".into(),
                    last_name: "Müller".into(),
                },
                Student {
                    id: "s2".into(),
                    first_name: "Anna".into(),
                    last_name: "Schmidt".into(),
                },
            ],
            subjects: vec![Subject {
                id: "m".into(),
                name: "Mathe".into(),
                categories: vec![
                    Category {
                        id: "w".into(),
                        name: "Schriftlich".into(),
                        weight: 3.0,
                    },
                    Category {
                        id: "o".into(),
                        name: "Mündlich".into(),
                        weight: 1.0,
                    },
                ],
                exams: vec![
                    Exam {
                        id: "e1".into(),
                        name: "KA 1".into(),
                        category_id: "w".into(),
                        weight: 1.0,
                        date: Some("2024-09-30".into()),
                    },
                    Exam {
                        id: "e2".into(),
                        name: "KA 2".into(),
                        category_id: "w".into(),
                        weight: 1.0,
                        date: None,
                    },
                    Exam {
                        id: "e3".into(),
                        name: "Referat".into(),
                        category_id: "o".into(),
                        weight: 1.0,
                        date: None,
                    },
                ],
                grades: vec![
                    Grade {
                        exam_id: "e1".into(),
                        student_id: "s1".into(),
                        value: 1.0,
                    },
                    Grade {
                        exam_id: "e2".into(),
                        student_id: "s1".into(),
                        value: 2.0,
                    },
                    Grade {
                        exam_id: "e3".into(),
                        student_id: "s1".into(),
                        value: 2.5,
                    },
                ],
            }],
        }
    }

    #[test]
    fn csv_has_bom_two_headers_and_one_row_per_student() {
        let class = sample();
        let bytes = subject_csv(&class, &class.subjects[0]).expect("csv");
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Schüler;Schriftlich (75%);Schriftlich (75%);Ø Schriftlich;Mündlich (25%);Ø Mündlich;Gesamtnote;Tendenz"
        );
        assert_eq!(lines[1], ";KA 1;KA 2;;Referat;;;");
        // written 1.5 * 3 + oral 2.5 * 1 over 4 = 1.75
        assert_eq!(lines[2], "Müller, Max;1.00;2.00;1.50;2.50;2.50;1.75;2+");
        assert_eq!(lines[3], "Schmidt, Anna;-;-;-;-;-;-;-");
    }

    #[test]
    fn csv_label_without_first_name_is_last_name_only() {
        let mut class = sample();
        class.students.push(Student {
            id: "s3".into(),
            first_name: String::new(),
            last_name: "Cher".into(),
        });
        let bytes = subject_csv(&class, &class.subjects[0]).expect("csv");
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).expect("utf8");
        assert_eq!(text.lines().nth(4), Some("Cher;-;-;-;-;-;-;-"));
    }

    #[test]
    fn json_export_round_trips_through_import() {
        let classes = vec![sample()];
        let text = export_json(&classes).expect("export");
        let parsed = parse_import_document(&text).expect("import");
        assert_eq!(parsed, classes);
    }

    #[test]
    fn import_rejects_missing_or_non_list_classes() {
        let err = parse_import_document("{\"klassen\": []}").expect_err("missing");
        assert_eq!(err.code, "bad_format");
        let err = parse_import_document("{\"classes\": {}}").expect_err("object");
        assert_eq!(err.code, "bad_format");
        let err = parse_import_document("not json").expect_err("garbage");
        assert_eq!(err.code, "bad_json");
        let err = parse_import_document("{\"classes\": [{\"name\": \"x\"}]}").expect_err("shape");
        assert_eq!(err.code, "bad_format");
        assert_eq!(parse_import_document("{\"classes\": []}"), Ok(Vec::new()));
    }

    #[test]
    fn import_drops_grades_without_value() {
        let text = r#"{"classes": [{
            "id": "c1",
            "name": "5a",
            "subjects": [{
                "id": "m",
                "name": "Mathe",
                "grades": [
                    { "examId": "e1", "studentId": "s1", "value": null },
                    { "examId": "e1", "studentId": "s2", "value": 3 }
                ]
            }]
        }]}"#;
        let classes = parse_import_document(text).expect("null value accepted");
        let grades = &classes[0].subjects[0].grades;
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].student_id, "s2");
        assert_eq!(grades[0].value, 3.0);
    }
}
