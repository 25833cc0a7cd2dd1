use crate::calc::{is_valid_grade, parse_grade};
use crate::model::Student;
use crate::store::{GradeEntry, NewStudent};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("no data entered")]
    NoData,
    #[error("line {line}: expected \"Lastname, Firstname\" but found no comma")]
    MissingComma { line: usize },
    #[error("line {line}: last name or first name is missing")]
    MissingName { line: usize },
    #[error("too many lines: {lines} grades but only {students} students")]
    TooManyLines { lines: usize, students: usize },
    #[error("line {line}: \"{text}\" is not a valid grade (1-6)")]
    InvalidGrade { line: usize, text: String },
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::NoData => "no_data",
            ImportError::MissingComma { .. } => "missing_comma",
            ImportError::MissingName { .. } => "missing_name",
            ImportError::TooManyLines { .. } => "too_many_lines",
            ImportError::InvalidGrade { .. } => "invalid_grade",
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ImportError::MissingComma { line }
            | ImportError::MissingName { line }
            | ImportError::InvalidGrade { line, .. } => Some(*line),
            ImportError::NoData | ImportError::TooManyLines { .. } => None,
        }
    }
}

/// Non-blank lines, trimmed. Line numbers count only these lines, 1-based.
fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, l)| (i + 1, l))
}

fn split_comma(line: &str) -> Option<(&str, &str)> {
    let (last, first) = line.split_once(',')?;
    Some((last.trim(), first.trim()))
}

/// Lenient student list: `Lastname, Firstname`, `Firstname Lastname` (the
/// last whitespace token is the last name), or a single last name.
pub fn parse_student_list(text: &str) -> Vec<NewStudent> {
    records(text)
        .map(|(_, line)| {
            if let Some((last, first)) = split_comma(line) {
                return NewStudent {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                };
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.split_last() {
                Some((last, rest)) => NewStudent {
                    first_name: rest.join(" "),
                    last_name: last.to_string(),
                },
                None => NewStudent {
                    first_name: String::new(),
                    last_name: String::new(),
                },
            }
        })
        .collect()
}

/// Strict student column: every line must be `Lastname, Firstname` with both
/// parts present.
pub fn parse_student_column(text: &str) -> Result<Vec<NewStudent>, ImportError> {
    let mut out = Vec::new();
    for (line_no, line) in records(text) {
        let Some((last, first)) = split_comma(line) else {
            return Err(ImportError::MissingComma { line: line_no });
        };
        if last.is_empty() || first.is_empty() {
            return Err(ImportError::MissingName { line: line_no });
        }
        out.push(NewStudent {
            first_name: first.to_string(),
            last_name: last.to_string(),
        });
    }
    if out.is_empty() {
        return Err(ImportError::NoData);
    }
    Ok(out)
}

/// Strict grade column, matched to `students` by position. `-` leaves the
/// student without a grade, as does running out of lines.
pub fn parse_grade_column(text: &str, students: &[Student]) -> Result<Vec<GradeEntry>, ImportError> {
    let lines: Vec<(usize, &str)> = records(text).collect();
    if lines.is_empty() {
        return Err(ImportError::NoData);
    }
    if lines.len() > students.len() {
        return Err(ImportError::TooManyLines {
            lines: lines.len(),
            students: students.len(),
        });
    }

    let mut out = Vec::with_capacity(lines.len());
    for ((line_no, line), student) in lines.into_iter().zip(students) {
        if !is_valid_grade(line) {
            return Err(ImportError::InvalidGrade {
                line: line_no,
                text: line.to_string(),
            });
        }
        out.push(GradeEntry {
            student_id: student.id.clone(),
            value: parse_grade(line),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str) -> Student {
        Student {
            id: id.into(),
            first_name: "F".into(),
            last_name: "L".into(),
        }
    }

    fn pair(s: &NewStudent) -> (&str, &str) {
        (s.first_name.as_str(), s.last_name.as_str())
    }

    #[test]
    fn student_list_accepts_all_three_shapes() {
        let parsed = parse_student_list("Müller, Max\n\n  Anna Lena Schmidt \nCher\n");
        let pairs: Vec<(&str, &str)> = parsed.iter().map(pair).collect();
        assert_eq!(
            pairs,
            vec![("Max", "Müller"), ("Anna Lena", "Schmidt"), ("", "Cher")]
        );
    }

    #[test]
    fn student_column_requires_comma_and_both_names() {
        let ok = parse_student_column("Müller, Max\r\nSchmidt,Anna\n").expect("parse");
        assert_eq!(ok.len(), 2);
        assert_eq!(pair(&ok[1]), ("Anna", "Schmidt"));

        let err = parse_student_column("Müller, Max\n\nAnna Schmidt").expect_err("no comma");
        assert_eq!(err, ImportError::MissingComma { line: 2 });
        assert_eq!(err.code(), "missing_comma");

        let err = parse_student_column("Müller,").expect_err("missing first");
        assert_eq!(err, ImportError::MissingName { line: 1 });

        assert_eq!(parse_student_column(" \n\n").expect_err("empty"), ImportError::NoData);
    }

    #[test]
    fn grade_column_matches_students_by_position() {
        let students = vec![student("a"), student("b"), student("c")];
        let entries = parse_grade_column("2,3\n-\n", &students).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].student_id, "a");
        assert_eq!(entries[0].value, Some(2.3));
        assert_eq!(entries[1].student_id, "b");
        assert_eq!(entries[1].value, None);
    }

    #[test]
    fn grade_column_rejects_bad_lines() {
        let students = vec![student("a"), student("b")];
        let err = parse_grade_column("1\n2\n3", &students).expect_err("too many");
        assert_eq!(
            err,
            ImportError::TooManyLines {
                lines: 3,
                students: 2
            }
        );
        assert_eq!(err.line(), None);

        let err = parse_grade_column("1\n7", &students).expect_err("range");
        assert_eq!(
            err,
            ImportError::InvalidGrade {
                line: 2,
                text: "7".into()
            }
        );
        assert_eq!(err.to_string(), "line 2: \"7\" is not a valid grade (1-6)");
    }

    #[test]
    fn grade_column_reads_leading_numbers() {
        let students = vec![student("a"), student("b")];
        let entries = parse_grade_column("2 (nachgeschrieben)
3,0 Note", &students).expect("parse");
        assert_eq!(entries[0].value, Some(2.0));
        assert_eq!(entries[1].value, Some(3.0));

        let err = parse_grade_column("2
fehlt", &students).expect_err("no number");
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.code(), "invalid_grade");
    }
}
