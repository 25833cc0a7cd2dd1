pub mod backup;
pub mod categories;
pub mod classes;
pub mod core;
pub mod exams;
pub mod exchange;
pub mod grades;
pub mod students;
pub mod subjects;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::{SchoolClass, Subject};
use crate::store::GradebookStore;
use serde_json::json;

pub(crate) fn store_mut(state: &mut AppState) -> Result<&mut GradebookStore, HandlerErr> {
    state.store.as_mut().ok_or_else(HandlerErr::no_workspace)
}

pub(crate) fn find_class<'a>(
    store: &'a GradebookStore,
    class_id: &str,
) -> Result<&'a SchoolClass, HandlerErr> {
    store.snapshot().class(class_id).ok_or_else(|| {
        HandlerErr::not_found("class not found").with_details(json!({ "classId": class_id }))
    })
}

pub(crate) fn find_subject<'a>(
    store: &'a GradebookStore,
    class_id: &str,
    subject_id: &str,
) -> Result<(&'a SchoolClass, &'a Subject), HandlerErr> {
    find_class(store, class_id)?;
    store.snapshot().subject(class_id, subject_id).ok_or_else(|| {
        HandlerErr::not_found("subject not found").with_details(json!({ "subjectId": subject_id }))
    })
}
