use crate::calc::weight_percent;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_subject, store_mut};
use crate::ipc::params::{exam_date, optional_str, required_name, required_str, weight};
use crate::ipc::types::{AppState, Request};
use crate::store::NewExam;
use serde_json::json;

fn handle_exams_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let category_filter = optional_str(req, "categoryId")?;
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({ "exams": [] }));
    };
    let (_, subject) = find_subject(store, class_id, subject_id)?;

    let exams: Vec<serde_json::Value> = subject
        .exams
        .iter()
        .filter(|e| category_filter.map_or(true, |c| e.category_id == c))
        .map(|e| {
            let total: f64 = subject.exams_in(&e.category_id).map(|x| x.weight).sum();
            let graded = subject.grades.iter().filter(|g| g.exam_id == e.id).count();
            json!({
                "id": e.id,
                "name": e.name,
                "categoryId": e.category_id,
                "weight": e.weight,
                "percent": weight_percent(e.weight, total),
                "date": e.date,
                "gradeCount": graded,
            })
        })
        .collect();
    Ok(json!({ "exams": exams }))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let category_id = required_str(req, "categoryId")?;
    let name = required_name(req, "name")?;
    let weight = weight(req)?;
    let date = exam_date(req)?;

    let (_, subject) = find_subject(store, class_id, subject_id)?;
    if subject.category(category_id).is_none() {
        return Err(HandlerErr::not_found("category not found")
            .with_details(json!({ "categoryId": category_id })));
    }

    let exam_id = store
        .add_exam(
            class_id,
            subject_id,
            NewExam {
                name,
                category_id: category_id.to_string(),
                weight,
                date,
            },
        )
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "examId": exam_id }))
}

fn handle_exams_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let exam_id = required_str(req, "examId")?;
    let name = required_name(req, "name")?;
    let weight = weight(req)?;
    let date = exam_date(req)?;
    store
        .update_exam(class_id, subject_id, exam_id, &name, weight, date.as_deref())
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let exam_id = required_str(req, "examId")?;
    store
        .delete_exam(class_id, subject_id, exam_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exams.list" => handle_exams_list(state, req),
        "exams.create" => handle_exams_create(state, req),
        "exams.update" => handle_exams_update(state, req),
        "exams.delete" => handle_exams_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
