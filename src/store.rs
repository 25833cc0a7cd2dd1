use crate::model::{
    class_mut, new_id, subject_mut, AppSnapshot, Category, Exam, Grade, SchoolClass, Student,
    Subject,
};
use anyhow::Context;
use std::collections::HashSet;

/// Key under which the whole snapshot is persisted.
pub const STORAGE_KEY: &str = "schulnoten-storage";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    ClassAdded,
    ClassUpdated,
    ClassDeleted,
    ClassSelected,
    StudentAdded,
    StudentsAdded,
    StudentUpdated,
    StudentDeleted,
    StudentsReplaced,
    SubjectAdded,
    SubjectUpdated,
    SubjectDeleted,
    SubjectSelected,
    CategoryAdded,
    CategoryUpdated,
    CategoryDeleted,
    ExamAdded,
    ExamUpdated,
    ExamDeleted,
    GradeSet,
    ExamGradesImported,
    DataImported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub revision: u64,
    pub change: Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&StoreEvent)>;

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExam {
    pub name: String,
    pub category_id: String,
    pub weight: f64,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeEntry {
    pub student_id: String,
    pub value: Option<f64>,
}

/// What is being removed from a class. Everything that references the
/// removed entities goes with them.
enum Removal<'a> {
    Students(HashSet<String>),
    /// Every student whose id is not listed.
    StudentsNotIn(HashSet<String>),
    Categories {
        subject_id: &'a str,
        ids: HashSet<String>,
    },
    Exams {
        subject_id: &'a str,
        ids: HashSet<String>,
    },
}

fn cascade(class: &mut SchoolClass, removal: Removal<'_>) {
    match removal {
        Removal::Students(ids) => sweep_students(class, |id| ids.contains(id)),
        Removal::StudentsNotIn(keep) => sweep_students(class, |id| !keep.contains(id)),
        Removal::Categories { subject_id, ids } => {
            let Some(subject) = class.subject_mut(subject_id) else {
                return;
            };
            subject.categories.retain(|c| !ids.contains(&c.id));
            let exam_ids: HashSet<String> = subject
                .exams
                .iter()
                .filter(|e| ids.contains(&e.category_id))
                .map(|e| e.id.clone())
                .collect();
            cascade(
                class,
                Removal::Exams {
                    subject_id,
                    ids: exam_ids,
                },
            );
        }
        Removal::Exams { subject_id, ids } => {
            let Some(subject) = class.subject_mut(subject_id) else {
                return;
            };
            subject.exams.retain(|e| !ids.contains(&e.id));
            subject.grades.retain(|g| !ids.contains(&g.exam_id));
        }
    }
}

fn sweep_students(class: &mut SchoolClass, removed: impl Fn(&str) -> bool) {
    class.students.retain(|s| !removed(&s.id));
    for subject in &mut class.subjects {
        subject.grades.retain(|g| !removed(&g.student_id));
    }
}

fn make_students(students: Vec<NewStudent>) -> Vec<Student> {
    students
        .into_iter()
        .map(|s| Student {
            id: new_id(),
            first_name: s.first_name,
            last_name: s.last_name,
        })
        .collect()
}

/// Owner of the gradebook state.
///
/// Mutations work on a copy of the snapshot: the copy is persisted first and
/// only then replaces the current state, so a failed write leaves nothing
/// half-applied. Each commit bumps the revision and notifies observers.
pub struct GradebookStore {
    state: AppSnapshot,
    backend: Option<Box<dyn KeyValueStore>>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    revision: u64,
}

impl GradebookStore {
    pub fn open(backend: Box<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let state = match backend.get(STORAGE_KEY)? {
            Some(text) => {
                serde_json::from_str(&text).context("stored snapshot is not valid JSON")?
            }
            None => AppSnapshot::default(),
        };
        tracing::info!(classes = state.classes.len(), "gradebook loaded");
        Ok(Self {
            state,
            backend: Some(backend),
            observers: Vec::new(),
            next_subscription: 0,
            revision: 0,
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            state: AppSnapshot::default(),
            backend: None,
            observers: Vec::new(),
            next_subscription: 0,
            revision: 0,
        }
    }

    pub fn snapshot(&self) -> &AppSnapshot {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selected_class(&self) -> Option<&SchoolClass> {
        let id = self.state.selected_class_id.as_deref()?;
        self.state.class(id)
    }

    pub fn selected_subject(&self) -> Option<&Subject> {
        let id = self.state.selected_subject_id.as_deref()?;
        self.selected_class()?.subject(id)
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    #[cfg(test)]
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    fn commit(&mut self, next: AppSnapshot, change: Change) -> anyhow::Result<()> {
        if let Some(backend) = self.backend.as_mut() {
            let text = serde_json::to_string(&next).context("failed to serialize snapshot")?;
            backend.set(STORAGE_KEY, &text)?;
        }
        self.state = next;
        self.revision += 1;
        tracing::debug!(revision = self.revision, ?change, "store commit");

        let event = StoreEvent {
            revision: self.revision,
            change,
        };
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
        Ok(())
    }

    fn update<R>(
        &mut self,
        change: Change,
        f: impl FnOnce(&mut AppSnapshot) -> R,
    ) -> anyhow::Result<R> {
        let mut next = self.state.clone();
        let out = f(&mut next);
        self.commit(next, change)?;
        Ok(out)
    }

    // Classes

    pub fn add_class(&mut self, name: &str) -> anyhow::Result<String> {
        let class = SchoolClass {
            id: new_id(),
            name: name.to_string(),
            students: Vec::new(),
            subjects: Vec::new(),
        };
        self.update(Change::ClassAdded, |s| {
            let id = class.id.clone();
            s.classes.push(class);
            s.selected_class_id = Some(id.clone());
            s.selected_subject_id = None;
            id
        })
    }

    pub fn update_class(&mut self, class_id: &str, name: &str) -> anyhow::Result<()> {
        self.update(Change::ClassUpdated, |s| {
            if let Some(c) = class_mut(&mut s.classes, class_id) {
                c.name = name.to_string();
            }
        })
    }

    pub fn delete_class(&mut self, class_id: &str) -> anyhow::Result<()> {
        self.update(Change::ClassDeleted, |s| {
            s.classes.retain(|c| c.id != class_id);
            if s.selected_class_id.as_deref() == Some(class_id) {
                s.selected_class_id = None;
                s.selected_subject_id = None;
            }
        })
    }

    pub fn select_class(&mut self, class_id: Option<&str>) -> anyhow::Result<()> {
        self.update(Change::ClassSelected, |s| {
            s.selected_class_id = class_id.map(str::to_string);
            s.selected_subject_id = None;
        })
    }

    // Students

    pub fn add_student(
        &mut self,
        class_id: &str,
        first_name: &str,
        last_name: &str,
    ) -> anyhow::Result<Option<String>> {
        let ids = self.add_students(
            class_id,
            vec![NewStudent {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            }],
        )?;
        Ok(ids.into_iter().next())
    }

    /// Appends students in order. Returns the new ids, empty if the class
    /// does not exist.
    pub fn add_students(
        &mut self,
        class_id: &str,
        students: Vec<NewStudent>,
    ) -> anyhow::Result<Vec<String>> {
        let change = if students.len() == 1 {
            Change::StudentAdded
        } else {
            Change::StudentsAdded
        };
        let created = make_students(students);
        self.update(change, |s| {
            let Some(c) = class_mut(&mut s.classes, class_id) else {
                return Vec::new();
            };
            let ids: Vec<String> = created.iter().map(|st| st.id.clone()).collect();
            c.students.extend(created);
            ids
        })
    }

    pub fn update_student(
        &mut self,
        class_id: &str,
        student_id: &str,
        first_name: &str,
        last_name: &str,
    ) -> anyhow::Result<()> {
        self.update(Change::StudentUpdated, |s| {
            let Some(c) = class_mut(&mut s.classes, class_id) else {
                return;
            };
            if let Some(st) = c.students.iter_mut().find(|st| st.id == student_id) {
                st.first_name = first_name.to_string();
                st.last_name = last_name.to_string();
            }
        })
    }

    pub fn delete_student(&mut self, class_id: &str, student_id: &str) -> anyhow::Result<()> {
        self.update(Change::StudentDeleted, |s| {
            if let Some(c) = class_mut(&mut s.classes, class_id) {
                cascade(c, Removal::Students(HashSet::from([student_id.to_string()])));
            }
        })
    }

    /// Discards the class's students and creates fresh ones. Grades of the
    /// previous students are dropped in every subject, whatever their names.
    pub fn replace_students(
        &mut self,
        class_id: &str,
        students: Vec<NewStudent>,
    ) -> anyhow::Result<Vec<String>> {
        let created = make_students(students);
        self.update(Change::StudentsReplaced, |s| {
            let Some(c) = class_mut(&mut s.classes, class_id) else {
                return Vec::new();
            };
            let ids: Vec<String> = created.iter().map(|st| st.id.clone()).collect();
            cascade(c, Removal::StudentsNotIn(ids.iter().cloned().collect()));
            c.students = created;
            ids
        })
    }

    // Subjects

    pub fn add_subject(&mut self, class_id: &str, name: &str) -> anyhow::Result<Option<String>> {
        let subject = Subject {
            id: new_id(),
            name: name.to_string(),
            categories: Vec::new(),
            exams: Vec::new(),
            grades: Vec::new(),
        };
        self.update(Change::SubjectAdded, |s| {
            let c = class_mut(&mut s.classes, class_id)?;
            let id = subject.id.clone();
            c.subjects.push(subject);
            s.selected_subject_id = Some(id.clone());
            Some(id)
        })
    }

    pub fn update_subject(
        &mut self,
        class_id: &str,
        subject_id: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        self.update(Change::SubjectUpdated, |s| {
            if let Some(subj) = subject_mut(&mut s.classes, class_id, subject_id) {
                subj.name = name.to_string();
            }
        })
    }

    pub fn delete_subject(&mut self, class_id: &str, subject_id: &str) -> anyhow::Result<()> {
        self.update(Change::SubjectDeleted, |s| {
            if let Some(c) = class_mut(&mut s.classes, class_id) {
                c.subjects.retain(|subj| subj.id != subject_id);
            }
            if s.selected_subject_id.as_deref() == Some(subject_id) {
                s.selected_subject_id = None;
            }
        })
    }

    pub fn select_subject(&mut self, subject_id: Option<&str>) -> anyhow::Result<()> {
        self.update(Change::SubjectSelected, |s| {
            s.selected_subject_id = subject_id.map(str::to_string);
        })
    }

    // Categories

    pub fn add_category(
        &mut self,
        class_id: &str,
        subject_id: &str,
        name: &str,
        weight: f64,
    ) -> anyhow::Result<Option<String>> {
        let category = Category {
            id: new_id(),
            name: name.to_string(),
            weight,
        };
        self.update(Change::CategoryAdded, |s| {
            let subj = subject_mut(&mut s.classes, class_id, subject_id)?;
            let id = category.id.clone();
            subj.categories.push(category);
            Some(id)
        })
    }

    pub fn update_category(
        &mut self,
        class_id: &str,
        subject_id: &str,
        category_id: &str,
        name: &str,
        weight: f64,
    ) -> anyhow::Result<()> {
        self.update(Change::CategoryUpdated, |s| {
            let Some(subj) = subject_mut(&mut s.classes, class_id, subject_id) else {
                return;
            };
            if let Some(cat) = subj.categories.iter_mut().find(|c| c.id == category_id) {
                cat.name = name.to_string();
                cat.weight = weight;
            }
        })
    }

    pub fn delete_category(
        &mut self,
        class_id: &str,
        subject_id: &str,
        category_id: &str,
    ) -> anyhow::Result<()> {
        self.update(Change::CategoryDeleted, |s| {
            if let Some(c) = class_mut(&mut s.classes, class_id) {
                cascade(
                    c,
                    Removal::Categories {
                        subject_id,
                        ids: HashSet::from([category_id.to_string()]),
                    },
                );
            }
        })
    }

    // Exams

    /// Adds an exam to the subject. Nothing is added when its category is
    /// not part of the same subject.
    pub fn add_exam(
        &mut self,
        class_id: &str,
        subject_id: &str,
        exam: NewExam,
    ) -> anyhow::Result<Option<String>> {
        let exam = Exam {
            id: new_id(),
            name: exam.name,
            category_id: exam.category_id,
            weight: exam.weight,
            date: exam.date,
        };
        self.update(Change::ExamAdded, |s| {
            let subj = subject_mut(&mut s.classes, class_id, subject_id)?;
            subj.category(&exam.category_id)?;
            let id = exam.id.clone();
            subj.exams.push(exam);
            Some(id)
        })
    }

    pub fn update_exam(
        &mut self,
        class_id: &str,
        subject_id: &str,
        exam_id: &str,
        name: &str,
        weight: f64,
        date: Option<&str>,
    ) -> anyhow::Result<()> {
        self.update(Change::ExamUpdated, |s| {
            let Some(subj) = subject_mut(&mut s.classes, class_id, subject_id) else {
                return;
            };
            if let Some(e) = subj.exams.iter_mut().find(|e| e.id == exam_id) {
                e.name = name.to_string();
                e.weight = weight;
                e.date = date.map(str::to_string);
            }
        })
    }

    pub fn delete_exam(
        &mut self,
        class_id: &str,
        subject_id: &str,
        exam_id: &str,
    ) -> anyhow::Result<()> {
        self.update(Change::ExamDeleted, |s| {
            if let Some(c) = class_mut(&mut s.classes, class_id) {
                cascade(
                    c,
                    Removal::Exams {
                        subject_id,
                        ids: HashSet::from([exam_id.to_string()]),
                    },
                );
            }
        })
    }

    // Grades

    /// `None` removes the record for the pair.
    pub fn set_grade(
        &mut self,
        class_id: &str,
        subject_id: &str,
        student_id: &str,
        exam_id: &str,
        value: Option<f64>,
    ) -> anyhow::Result<()> {
        self.update(Change::GradeSet, |s| {
            let Some(subj) = subject_mut(&mut s.classes, class_id, subject_id) else {
                return;
            };
            let existing = subj
                .grades
                .iter()
                .position(|g| g.student_id == student_id && g.exam_id == exam_id);
            match (existing, value) {
                (Some(i), Some(v)) => subj.grades[i].value = v,
                (Some(i), None) => {
                    subj.grades.remove(i);
                }
                (None, Some(v)) => subj.grades.push(Grade {
                    exam_id: exam_id.to_string(),
                    student_id: student_id.to_string(),
                    value: v,
                }),
                (None, None) => {}
            }
        })
    }

    /// Replaces the exam's whole column: existing grades for the exam are
    /// removed, then one record per entry that carries a value is added.
    pub fn import_exam_grades(
        &mut self,
        class_id: &str,
        subject_id: &str,
        exam_id: &str,
        grades: Vec<GradeEntry>,
    ) -> anyhow::Result<()> {
        self.update(Change::ExamGradesImported, |s| {
            let Some(subj) = subject_mut(&mut s.classes, class_id, subject_id) else {
                return;
            };
            subj.grades.retain(|g| g.exam_id != exam_id);
            subj.grades.extend(grades.into_iter().filter_map(|g| {
                g.value.map(|value| Grade {
                    exam_id: exam_id.to_string(),
                    student_id: g.student_id,
                    value,
                })
            }));
        })
    }

    // Whole dataset

    pub fn export_data(&self) -> Vec<SchoolClass> {
        self.state.classes.clone()
    }

    pub fn import_data(&mut self, classes: Vec<SchoolClass>) -> anyhow::Result<()> {
        tracing::info!(classes = classes.len(), "importing dataset");
        self.update(Change::DataImported, |s| {
            s.selected_class_id = classes.first().map(|c| c.id.clone());
            s.selected_subject_id = None;
            s.classes = classes;
        })
    }
}
