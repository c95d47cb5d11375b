//! Test utilities and common setup.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use classreg::account::{AccountApi, AccountError, AccountResult};
use classreg::registration::{BasicInfoForm, CancelSignalHub, RegistrationWizard, RoleDetail};
use classreg::roledetail::{RoleDetailApi, RoleDetailError, RoleDetailResult};
use classreg_protocol::account::{
    AccountRole, CreateAccountRequest, CreatedAccount, FieldErrors, LoginSuccess, UserRecord,
};
use classreg_protocol::roles::{ParentLink, StudentRecord, TeacherAssignment};

/// In-memory account service recording every call.
pub struct FakeAccountService {
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub get_user_calls: AtomicUsize,
    /// When set, `create_account` fails with this field error.
    pub create_field_error: Mutex<Option<(String, String)>>,
    /// When set, `create_account` fails like an unreachable backend.
    pub fail_create_network: AtomicBool,
    /// When set, `delete_account` fails after recording the call.
    pub fail_delete: AtomicBool,
    /// Permissions returned directly by `login`.
    pub login_permissions: Mutex<Vec<String>>,
    /// Per-call permissions returned by successive `get_user` lookups.
    pub user_permissions: Mutex<VecDeque<Vec<String>>>,
    gate: Semaphore,
    gated: AtomicBool,
}

impl FakeAccountService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            get_user_calls: AtomicUsize::new(0),
            create_field_error: Mutex::new(None),
            fail_create_network: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            login_permissions: Mutex::new(Vec::new()),
            user_permissions: Mutex::new(VecDeque::new()),
            gate: Semaphore::new(0),
            gated: AtomicBool::new(false),
        })
    }

    /// Make `create_account` block until [`release_create`](Self::release_create).
    pub fn hold_create(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Release one held `create_account` call.
    pub fn release_create(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl AccountApi for FakeAccountService {
    async fn create_account(&self, request: CreateAccountRequest) -> AccountResult<CreatedAccount> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.gated.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.expect("create gate closed");
            permit.forget();
        }
        if self.fail_create_network.load(Ordering::SeqCst) {
            return Err(AccountError::Api("connection reset by peer".to_string()));
        }
        if let Some((field, message)) = self.create_field_error.lock().unwrap().clone() {
            let mut fields = BTreeMap::new();
            fields.insert(field, message);
            return Err(AccountError::Validation(FieldErrors(fields)));
        }

        Ok(CreatedAccount {
            account_id: format!("acc-{call}"),
            role: request.role,
        })
    }

    async fn delete_account(&self, account_id: &str, _role: AccountRole) -> AccountResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.deleted.lock().unwrap().push(account_id.to_string());

        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AccountError::Api("delete failed".to_string()));
        }
        Ok(())
    }

    async fn login(&self, _username: &str, _password: &str) -> AccountResult<LoginSuccess> {
        Ok(LoginSuccess {
            token: "tok-1".to_string(),
            account_id: "acc-1".to_string(),
            role: AccountRole::Teacher,
            permissions: self.login_permissions.lock().unwrap().clone(),
        })
    }

    async fn get_user(&self, account_id: &str) -> AccountResult<UserRecord> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        let permissions = self
            .user_permissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();

        Ok(UserRecord {
            account_id: account_id.to_string(),
            role: AccountRole::Teacher,
            permissions,
        })
    }
}

/// In-memory role-detail service recording submitted batches.
pub struct FakeRoleDetailService {
    pub teacher_batches: Mutex<Vec<(String, String, Vec<TeacherAssignment>)>>,
    pub student_records: Mutex<Vec<(String, StudentRecord)>>,
    pub parent_batches: Mutex<Vec<(String, Vec<ParentLink>)>>,
    /// Submissions attempted, counted before any gating or failure.
    pub submit_attempts: AtomicUsize,
    /// When set, every submission is rejected before being recorded.
    pub fail_submissions: AtomicBool,
    gate: Semaphore,
    gated: AtomicBool,
}

impl FakeRoleDetailService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            teacher_batches: Mutex::new(Vec::new()),
            student_records: Mutex::new(Vec::new()),
            parent_batches: Mutex::new(Vec::new()),
            submit_attempts: AtomicUsize::new(0),
            fail_submissions: AtomicBool::new(false),
            gate: Semaphore::new(0),
            gated: AtomicBool::new(false),
        })
    }

    pub fn submission_count(&self) -> usize {
        self.teacher_batches.lock().unwrap().len()
            + self.student_records.lock().unwrap().len()
            + self.parent_batches.lock().unwrap().len()
    }

    /// Make the next submission block until [`release`](Self::release).
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Release one held submission.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    async fn checkpoint(&self) -> RoleDetailResult<()> {
        self.submit_attempts.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.expect("submit gate closed");
            permit.forget();
        }
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(RoleDetailError::Rejected("storage offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleDetailApi for FakeRoleDetailService {
    async fn submit_teacher_assignments(
        &self,
        account_id: &str,
        _role: AccountRole,
        staff_no: &str,
        assignments: &[TeacherAssignment],
    ) -> RoleDetailResult<()> {
        self.checkpoint().await?;
        self.teacher_batches.lock().unwrap().push((
            account_id.to_string(),
            staff_no.to_string(),
            assignments.to_vec(),
        ));
        Ok(())
    }

    async fn submit_student_record(
        &self,
        account_id: &str,
        _role: AccountRole,
        record: &StudentRecord,
    ) -> RoleDetailResult<()> {
        self.checkpoint().await?;
        self.student_records
            .lock()
            .unwrap()
            .push((account_id.to_string(), record.clone()));
        Ok(())
    }

    async fn submit_parent_links(
        &self,
        account_id: &str,
        _role: AccountRole,
        links: &[ParentLink],
    ) -> RoleDetailResult<()> {
        self.checkpoint().await?;
        self.parent_batches
            .lock()
            .unwrap()
            .push((account_id.to_string(), links.to_vec()));
        Ok(())
    }
}

/// A wizard wired to fresh fakes.
pub fn test_wizard() -> (
    Arc<RegistrationWizard>,
    Arc<FakeAccountService>,
    Arc<FakeRoleDetailService>,
) {
    let account = FakeAccountService::new();
    let details = FakeRoleDetailService::new();
    let wizard = RegistrationWizard::new(
        account.clone(),
        details.clone(),
        CancelSignalHub::new(),
    );
    (wizard, account, details)
}

/// A valid phase-1 form for the given role.
pub fn basic_form(role: AccountRole) -> BasicInfoForm {
    BasicInfoForm {
        name: "Nimal Perera".to_string(),
        email: "nimal@example.com".to_string(),
        address: "12 Lake Rd, Kandy".to_string(),
        birth_date: "1990-04-12".to_string(),
        contact: "0771234567".to_string(),
        role,
        username: "abc".to_string(),
        password: "secret1".to_string(),
        password_confirmation: "secret1".to_string(),
        gender: "male".to_string(),
    }
}

pub fn assignment(grade: &str, class: &str, subject: &str, medium: &str) -> RoleDetail {
    RoleDetail::Teacher(TeacherAssignment {
        grade: grade.to_string(),
        class: class.to_string(),
        subject: subject.to_string(),
        medium: medium.to_string(),
    })
}

pub fn parent_link(admission_no: &str, relation: &str) -> RoleDetail {
    RoleDetail::ParentLink(ParentLink {
        student_admission_no: admission_no.to_string(),
        profession: "Engineer".to_string(),
        relation: relation.to_string(),
        contact: "0770000000".to_string(),
    })
}

pub fn student_record() -> StudentRecord {
    StudentRecord {
        admission_no: "ADM-100".to_string(),
        grade: "Grade 8".to_string(),
        class: "Araliya".to_string(),
        medium: "English".to_string(),
        guardian_contact: "0770000000".to_string(),
    }
}

/// Poll until the condition holds or a short deadline passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
