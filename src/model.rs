use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        if self.first_name.is_empty() {
            self.last_name.clone()
        } else {
            format!("{}, {}", self.last_name, self.first_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A recorded grade. Absence of a grade is the absence of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub exam_id: String,
    pub student_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub exams: Vec<Exam>,
    #[serde(default, deserialize_with = "grades_skipping_null")]
    pub grades: Vec<Grade>,
}

/// Records with `"value": null` mean "no grade" and are dropped.
fn grades_skipping_null<'de, D>(deserializer: D) -> Result<Vec<Grade>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct MaybeGrade {
        exam_id: String,
        student_id: String,
        value: Option<f64>,
    }

    let raw = Vec::<MaybeGrade>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|g| {
            Some(Grade {
                exam_id: g.exam_id,
                student_id: g.student_id,
                value: g.value?,
            })
        })
        .collect())
}

impl Subject {
    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn exams_in<'a>(&'a self, category_id: &'a str) -> impl Iterator<Item = &'a Exam> + 'a {
        self.exams.iter().filter(move |e| e.category_id == category_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl SchoolClass {
    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == subject_id)
    }

    pub fn subject_mut(&mut self, subject_id: &str) -> Option<&mut Subject> {
        self.subjects.iter_mut().find(|s| s.id == subject_id)
    }
}

/// Everything persisted under the storage key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSnapshot {
    #[serde(default)]
    pub classes: Vec<SchoolClass>,
    #[serde(default)]
    pub selected_class_id: Option<String>,
    #[serde(default)]
    pub selected_subject_id: Option<String>,
}

impl AppSnapshot {
    pub fn class(&self, class_id: &str) -> Option<&SchoolClass> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn subject(&self, class_id: &str, subject_id: &str) -> Option<(&SchoolClass, &Subject)> {
        let class = self.class(class_id)?;
        let subject = class.subject(subject_id)?;
        Some((class, subject))
    }
}

pub fn class_mut<'a>(classes: &'a mut [SchoolClass], class_id: &str) -> Option<&'a mut SchoolClass> {
    classes.iter_mut().find(|c| c.id == class_id)
}

pub fn subject_mut<'a>(
    classes: &'a mut [SchoolClass],
    class_id: &str,
    subject_id: &str,
) -> Option<&'a mut Subject> {
    class_mut(classes, class_id)?.subject_mut(subject_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_uses_camel_case_keys() {
        let snap = AppSnapshot {
            classes: vec![SchoolClass {
                id: "c1".into(),
                name: "5a".into(),
                students: vec![Student {
                    id: "s1".into(),
                    first_name: "Max".into(),
                    last_name: "Müller".into(),
                }],
                subjects: vec![Subject {
                    id: "m".into(),
                    name: "Mathe".into(),
                    categories: vec![],
                    exams: vec![Exam {
                        id: "e1".into(),
                        name: "KA 1".into(),
                        category_id: "k".into(),
                        weight: 1.0,
                        date: None,
                    }],
                    grades: vec![],
                }],
            }],
            selected_class_id: Some("c1".into()),
            selected_subject_id: None,
        };
        let v = serde_json::to_value(&snap).expect("serialize");
        assert_eq!(v["selectedClassId"], "c1");
        assert!(v["selectedSubjectId"].is_null());
        assert_eq!(v["classes"][0]["students"][0]["firstName"], "Max");
        assert_eq!(v["classes"][0]["subjects"][0]["exams"][0]["categoryId"], "k");
        assert!(v["classes"][0]["subjects"][0]["exams"][0].get("date").is_none());
    }

    #[test]
    fn display_name_without_first_name_is_last_name() {
        let s = Student {
            id: "x".into(),
            first_name: String::new(),
            last_name: "Cher".into(),
        };
        assert_eq!(s.display_name(), "Cher");
    }

    #[test]
    fn null_grade_values_are_dropped_on_load() {
        let subject: Subject = serde_json::from_value(serde_json::json!({
            "id": "m",
            "name": "Mathe",
            "grades": [
                { "examId": "e1", "studentId": "s1", "value": 2.5 },
                { "examId": "e1", "studentId": "s2", "value": null },
                { "examId": "e2", "studentId": "s1" }
            ]
        }))
        .expect("deserialize subject");
        assert_eq!(
            subject.grades,
            vec![Grade {
                exam_id: "e1".into(),
                student_id: "s1".into(),
                value: 2.5,
            }]
        );
    }
}
