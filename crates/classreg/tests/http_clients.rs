//! HTTP client tests against an in-process backend.
//!
//! Exercises the real reqwest clients end to end, including the response
//! shapes the normalization boundary has to absorb.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde_json::{Value, json};

use classreg::account::{AccountApi, AccountClient, AccountError};
use classreg::auth::{AuthService, LoginOutcome, SessionContext, SessionHandle};
use classreg::reference::ReferenceClient;
use classreg::registration::{
    CancelReason, CancelSignalHub, CompleteOutcome, PhaseKind, RegistrationWizard, RoleDetail,
    RoleDetailsForm,
};
use classreg::roledetail::RoleDetailClient;
use classreg_protocol::account::{AccountRole, CreateAccountRequest};
use classreg_protocol::roles::TeacherAssignment;

#[derive(Default)]
struct BackendState {
    deletes: Mutex<Vec<String>>,
    user_lookups: AtomicUsize,
    teacher_batches: Mutex<Vec<Value>>,
}

async fn create_account(
    State(_state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Response {
    if body["username"] == "taken" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"errors": {"username": "already taken"}})),
        )
            .into_response();
    }

    (
        StatusCode::CREATED,
        Json(json!({"data": {"accountId": "acc-123", "role": body["role"]}})),
    )
        .into_response()
}

async fn delete_account(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> Response {
    let mut deletes = state.deletes.lock().unwrap();
    if deletes.contains(&id) {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response();
    }
    deletes.push(id);
    StatusCode::NO_CONTENT.into_response()
}

async fn login(State(_state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid credentials"})),
        )
            .into_response();
    }

    if body["username"] == "lazy" {
        // Permissions resolved later via the user record.
        return Json(json!({"token": "tok-lazy", "accountId": "acc-9", "role": "teacher"}))
            .into_response();
    }

    Json(json!({
        "token": "tok-1",
        "accountId": "acc-1",
        "role": "teacher",
        "permissions": ["marks.edit"],
    }))
    .into_response()
}

async fn get_user(State(state): State<Arc<BackendState>>, Path(id): Path<String>) -> Response {
    if id == "expired" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "token expired"})),
        )
            .into_response();
    }

    let lookups = state.user_lookups.fetch_add(1, Ordering::SeqCst) + 1;
    let permissions: Vec<&str> = if lookups < 2 { vec![] } else { vec!["marks.view"] };

    Json(json!({"accountId": id, "role": "teacher", "permissions": permissions})).into_response()
}

async fn submit_teacher_assignments(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Response {
    state.teacher_batches.lock().unwrap().push(body);
    Json(json!({"success": true})).into_response()
}

async fn grades() -> Json<Value> {
    Json(json!([{"grade": "Grade 8"}, {"grade": "Grade 9"}]))
}

async fn classes() -> Json<Value> {
    Json(json!({"data": [{"class": "Araliya"}]}))
}

async fn subjects() -> Json<Value> {
    Json(json!([
        {"mainSubject": "Mathematics", "medium": "English", "grade": "Grade 8"},
        {"mainSubject": "Science", "subSubject": "Biology", "medium": "Sinhala", "grade": "Grade 10"},
    ]))
}

async fn spawn_backend() -> (String, Arc<BackendState>) {
    let state = Arc::new(BackendState::default());
    let app = Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/{id}", delete(delete_account))
        .route("/auth/login", post(login))
        .route("/users/{id}", get(get_user))
        .route("/teachers/assignments", post(submit_teacher_assignments))
        .route("/reference/grades", get(grades))
        .route("/reference/classes", get(classes))
        .route("/reference/subjects", get(subjects))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

fn create_request(username: &str) -> CreateAccountRequest {
    CreateAccountRequest {
        name: "Nimal Perera".to_string(),
        email: "nimal@example.com".to_string(),
        address: "12 Lake Rd, Kandy".to_string(),
        birth_date: "1990-04-12".to_string(),
        contact: "0771234567".to_string(),
        role: AccountRole::Teacher,
        username: username.to_string(),
        password: "secret1".to_string(),
        gender: "male".to_string(),
    }
}

#[tokio::test]
async fn test_create_account_normalizes_envelope() {
    let (base_url, _) = spawn_backend().await;
    let client = AccountClient::new(base_url, SessionHandle::new());

    let created = client.create_account(create_request("nimal")).await.unwrap();
    assert_eq!(created.account_id, "acc-123");
    assert_eq!(created.role, AccountRole::Teacher);
}

#[tokio::test]
async fn test_create_conflict_maps_field_errors() {
    let (base_url, _) = spawn_backend().await;
    let client = AccountClient::new(base_url, SessionHandle::new());

    let err = client
        .create_account(create_request("taken"))
        .await
        .unwrap_err();
    let AccountError::Validation(fields) = err else {
        panic!("expected field-level errors");
    };
    assert_eq!(fields.get("username"), Some("already taken"));
}

#[tokio::test]
async fn test_delete_account_is_idempotent() {
    let (base_url, state) = spawn_backend().await;
    let client = AccountClient::new(base_url, SessionHandle::new());

    client
        .delete_account("acc-123", AccountRole::Teacher)
        .await
        .unwrap();
    // The second delete answers 404; the client treats that as done.
    client
        .delete_account("acc-123", AccountRole::Teacher)
        .await
        .unwrap();

    assert_eq!(state.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_login_permission_retry_end_to_end() {
    let (base_url, state) = spawn_backend().await;
    let session = SessionHandle::new();
    let account = Arc::new(AccountClient::new(base_url, session.clone()));
    let auth = AuthService::new(account, session.clone())
        .with_retry_delay(Duration::from_millis(1));

    let outcome = auth.login("lazy", "secret1").await.unwrap();
    let LoginOutcome::Authorized(context) = outcome else {
        panic!("expected an authorized session");
    };

    assert_eq!(context.permissions, vec!["marks.view".to_string()]);
    assert_eq!(state.user_lookups.load(Ordering::SeqCst), 2);
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_unauthorized_response_clears_session() {
    let (base_url, _) = spawn_backend().await;
    let session = SessionHandle::new();
    session.set(SessionContext {
        token: "stale".to_string(),
        account_id: "acc-1".to_string(),
        role: AccountRole::Teacher,
        permissions: vec!["marks.edit".to_string()],
        established_at: Utc::now(),
    });

    let client = AccountClient::new(base_url, session.clone());
    let err = client.get_user("expired").await.unwrap_err();

    assert!(matches!(err, AccountError::Unauthorized));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_reference_lists_normalize_both_framings() {
    let (base_url, _) = spawn_backend().await;
    let client = ReferenceClient::new(base_url, SessionHandle::new());

    // Bare array framing.
    let grades = client.list_grades().await.unwrap();
    assert_eq!(grades.len(), 2);
    assert_eq!(grades[0].grade, "Grade 8");

    // Enveloped framing.
    let classes = client.list_classes().await.unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].class, "Araliya");

    let subjects = client.list_subjects().await.unwrap();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].sub_subject, None);
    assert_eq!(subjects[1].sub_subject.as_deref(), Some("Biology"));
}

#[tokio::test]
async fn test_wizard_registration_over_http() {
    let (base_url, state) = spawn_backend().await;
    let session = SessionHandle::new();
    let account = Arc::new(AccountClient::new(base_url.clone(), session.clone()));
    let details = Arc::new(RoleDetailClient::new(base_url, session));
    let wizard = RegistrationWizard::new(account, details, CancelSignalHub::new());

    let form = classreg::registration::BasicInfoForm {
        name: "Nimal Perera".to_string(),
        email: "nimal@example.com".to_string(),
        address: "12 Lake Rd, Kandy".to_string(),
        birth_date: "1990-04-12".to_string(),
        contact: "0771234567".to_string(),
        role: AccountRole::Teacher,
        username: "nimal".to_string(),
        password: "secret1".to_string(),
        password_confirmation: "secret1".to_string(),
        gender: "male".to_string(),
    };
    wizard.submit_basic_info(form).await.unwrap();
    assert_eq!(wizard.account_id().as_deref(), Some("acc-123"));

    wizard
        .stage_assignment(RoleDetail::Teacher(TeacherAssignment {
            grade: "Grade 8".to_string(),
            class: "Araliya".to_string(),
            subject: "Mathematics".to_string(),
            medium: "English".to_string(),
        }))
        .unwrap();

    let outcome = wizard
        .submit_role_details(RoleDetailsForm::Teacher {
            staff_no: "ST-77".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, CompleteOutcome::Completed);
    assert_eq!(wizard.phase(), PhaseKind::Completed);

    let batches = state.teacher_batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["accountId"], "acc-123");
    assert_eq!(batches[0]["staffNo"], "ST-77");
    assert_eq!(batches[0]["assignments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_wizard_abandonment_deletes_account_over_http() {
    let (base_url, state) = spawn_backend().await;
    let session = SessionHandle::new();
    let account = Arc::new(AccountClient::new(base_url.clone(), session.clone()));
    let details = Arc::new(RoleDetailClient::new(base_url, session));
    let wizard = RegistrationWizard::new(account, details, CancelSignalHub::new());

    let form = classreg::registration::BasicInfoForm {
        name: "Kamala Silva".to_string(),
        email: "kamala@example.com".to_string(),
        address: "4 Hill St, Galle".to_string(),
        birth_date: "1985-01-30".to_string(),
        contact: "0719876543".to_string(),
        role: AccountRole::Parent,
        username: "kamala".to_string(),
        password: "secret1".to_string(),
        password_confirmation: "secret1".to_string(),
        gender: "female".to_string(),
    };
    wizard.submit_basic_info(form).await.unwrap();

    wizard.cancel(CancelReason::BackNavigation).await;

    assert_eq!(wizard.phase(), PhaseKind::CollectingBasicInfo);
    assert_eq!(state.deletes.lock().unwrap().as_slice(), ["acc-123"]);
}
