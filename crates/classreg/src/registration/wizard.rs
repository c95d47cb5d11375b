//! Registration wizard state machine.
//!
//! Phase 1 (`CollectingBasicInfo`) holds no backend state. A successful
//! basic-info submit creates a base account and moves to phase 2
//! (`CollectingRoleDetails`); from then until the final submit an abandoned
//! session must delete that account again. Cancellation listeners are
//! attached only inside that window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use classreg_protocol::account::{AccountRole, CreateAccountRequest};
use classreg_protocol::roles::{ParentLink, StudentRecord, TeacherAssignment};

use crate::account::AccountApi;
use crate::roledetail::RoleDetailApi;

use super::error::{WizardError, WizardResult};
use super::models::{
    BasicInfoForm, CancelOutcome, CompleteOutcome, PhaseKind, RoleDetail, RoleDetailsForm,
    StagedEntry, SubmitOutcome,
};
use super::signals::{CancelReason, CancelSignalHub};

/// Wizard phase, with the account binding folded into the variant so an
/// account id can only exist while role details are being collected.
#[derive(Debug, Clone)]
enum Phase {
    CollectingBasicInfo,
    CollectingRoleDetails {
        account_id: String,
        role: AccountRole,
    },
    Completed,
}

/// Mutable session state, held for the lifetime of the wizard.
struct SessionState {
    phase: Phase,
    pending: Vec<StagedEntry>,
    created_at: DateTime<Utc>,
}

/// Handle to the cancellation listener task attached during phase 2.
struct ListenerHandle {
    shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

/// Clears the submission flag when a submit attempt finishes, on every exit
/// path.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The two-phase registration wizard.
pub struct RegistrationWizard {
    account: Arc<dyn AccountApi>,
    role_details: Arc<dyn RoleDetailApi>,
    signals: CancelSignalHub,
    weak: Weak<RegistrationWizard>,
    state: Mutex<SessionState>,
    is_submitting: AtomicBool,
    listener: Mutex<Option<ListenerHandle>>,
}

impl RegistrationWizard {
    /// Create a new wizard in `CollectingBasicInfo`.
    pub fn new(
        account: Arc<dyn AccountApi>,
        role_details: Arc<dyn RoleDetailApi>,
        signals: CancelSignalHub,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            account,
            role_details,
            signals,
            weak: weak.clone(),
            state: Mutex::new(SessionState {
                phase: Phase::CollectingBasicInfo,
                pending: Vec::new(),
                created_at: Utc::now(),
            }),
            is_submitting: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    /// The hub this wizard listens on while in phase 2.
    pub fn signals(&self) -> &CancelSignalHub {
        &self.signals
    }

    /// Current phase.
    pub fn phase(&self) -> PhaseKind {
        match self.lock_state().phase {
            Phase::CollectingBasicInfo => PhaseKind::CollectingBasicInfo,
            Phase::CollectingRoleDetails { .. } => PhaseKind::CollectingRoleDetails,
            Phase::Completed => PhaseKind::Completed,
        }
    }

    /// Account id of the half-registered account, present only in phase 2.
    pub fn account_id(&self) -> Option<String> {
        match &self.lock_state().phase {
            Phase::CollectingRoleDetails { account_id, .. } => Some(account_id.clone()),
            _ => None,
        }
    }

    /// Role fixed by the phase-1 commit, present only in phase 2.
    pub fn account_role(&self) -> Option<AccountRole> {
        match &self.lock_state().phase {
            Phase::CollectingRoleDetails { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Snapshot of the staged entries, most-recently-added first.
    pub fn pending_assignments(&self) -> Vec<StagedEntry> {
        self.lock_state().pending.clone()
    }

    /// Whether a submit request is currently outstanding.
    pub fn is_submitting(&self) -> bool {
        self.is_submitting.load(Ordering::SeqCst)
    }

    /// When this session was started.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.lock_state().created_at
    }

    /// Submit the phase-1 form. On success the backend account exists, the
    /// wizard moves to `CollectingRoleDetails`, and cancellation listeners
    /// are attached.
    ///
    /// While another submission is in flight this is a no-op: nothing is
    /// sent and `AlreadySubmitting` is returned.
    #[instrument(skip(self, form), fields(username = %form.username, role = %form.role))]
    pub async fn submit_basic_info(&self, form: BasicInfoForm) -> WizardResult<SubmitOutcome> {
        if self
            .is_submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("submission already in flight, ignoring");
            return Ok(SubmitOutcome::AlreadySubmitting);
        }
        let _guard = SubmitGuard(&self.is_submitting);

        if !matches!(self.lock_state().phase, Phase::CollectingBasicInfo) {
            return Err(WizardError::InvalidPhase);
        }

        validate_basic_info(&form)?;

        let request = CreateAccountRequest {
            name: form.name,
            email: form.email,
            address: form.address,
            birth_date: form.birth_date,
            contact: form.contact,
            role: form.role,
            username: form.username,
            password: form.password,
            gender: form.gender,
        };

        let created = self.account.create_account(request).await?;

        {
            let mut state = self.lock_state();
            state.phase = Phase::CollectingRoleDetails {
                account_id: created.account_id.clone(),
                role: created.role,
            };
        }
        self.attach_cancel_listener();
        info!(account_id = %created.account_id, role = %created.role, "base account created");

        Ok(SubmitOutcome::Advanced)
    }

    /// Stage one role-detail entry (Teacher/Parent roles only).
    ///
    /// Rejects entries with missing sub-fields and exact duplicates of an
    /// already-staged entry; accepted entries are prepended. Returns the
    /// client-generated id used for removal.
    pub fn stage_assignment(&self, detail: RoleDetail) -> WizardResult<Uuid> {
        let mut state = self.lock_state();
        let role = match &state.phase {
            Phase::CollectingRoleDetails { role, .. } => *role,
            _ => return Err(WizardError::InvalidPhase),
        };

        if detail.role() != role {
            return Err(WizardError::RoleMismatch {
                role: role.to_string(),
            });
        }

        validate_detail(&detail)?;

        if state
            .pending
            .iter()
            .any(|entry| is_duplicate(&entry.detail, &detail))
        {
            return Err(WizardError::DuplicateEntry);
        }

        let entry = StagedEntry {
            id: Uuid::new_v4(),
            detail,
            staged_at: Utc::now(),
        };
        let id = entry.id;
        state.pending.insert(0, entry);
        debug!(entry_id = %id, staged = state.pending.len(), "entry staged");

        Ok(id)
    }

    /// Remove one staged entry by its client-generated id. No backend call.
    pub fn remove_assignment(&self, id: Uuid) -> WizardResult<()> {
        let mut state = self.lock_state();
        let before = state.pending.len();
        state.pending.retain(|entry| entry.id != id);
        if state.pending.len() == before {
            return Err(WizardError::UnknownEntry(id));
        }
        debug!(entry_id = %id, staged = state.pending.len(), "entry removed");
        Ok(())
    }

    /// Submit the phase-2 batch. On success the session is finished and the
    /// cancellation listeners are detached. On failure the wizard stays in
    /// `CollectingRoleDetails` with the staged entries intact, so the user
    /// can retry without re-entering data.
    #[instrument(skip(self, form))]
    pub async fn submit_role_details(&self, form: RoleDetailsForm) -> WizardResult<CompleteOutcome> {
        if self
            .is_submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("submission already in flight, ignoring");
            return Ok(CompleteOutcome::AlreadySubmitting);
        }
        let _guard = SubmitGuard(&self.is_submitting);

        let (account_id, role) = match &self.lock_state().phase {
            Phase::CollectingRoleDetails { account_id, role } => (account_id.clone(), *role),
            _ => return Err(WizardError::InvalidPhase),
        };

        match (role, form) {
            (AccountRole::Teacher, RoleDetailsForm::Teacher { staff_no }) => {
                require("staff_no", &staff_no)?;
                let assignments = self.staged_teacher_assignments();
                if assignments.is_empty() {
                    return Err(WizardError::invalid(
                        "assignments",
                        "at least one assignment must be staged",
                    ));
                }
                self.role_details
                    .submit_teacher_assignments(&account_id, role, &staff_no, &assignments)
                    .await?;
            }
            (AccountRole::Student, RoleDetailsForm::Student { record }) => {
                validate_student_record(&record)?;
                self.role_details
                    .submit_student_record(&account_id, role, &record)
                    .await?;
            }
            (AccountRole::Parent, RoleDetailsForm::Parent) => {
                let links = self.staged_parent_links();
                if links.is_empty() {
                    return Err(WizardError::invalid(
                        "links",
                        "at least one child link must be staged",
                    ));
                }
                self.role_details
                    .submit_parent_links(&account_id, role, &links)
                    .await?;
            }
            (role, _) => {
                return Err(WizardError::RoleMismatch {
                    role: role.to_string(),
                });
            }
        }

        {
            let mut state = self.lock_state();
            state.phase = Phase::Completed;
            state.pending.clear();
        }
        self.detach_cancel_listener();
        info!(%account_id, %role, "registration completed");

        Ok(CompleteOutcome::Completed)
    }

    /// Abandon the session. Valid only in `CollectingRoleDetails`; anywhere
    /// else it is a no-op.
    ///
    /// The local reset (back to `CollectingBasicInfo`, staged entries
    /// cleared, listeners detached) is unconditional; the compensating
    /// delete is attempted exactly once and its failure only logged — the
    /// backend may then retain an orphaned account.
    #[instrument(skip(self))]
    pub async fn cancel(&self, reason: CancelReason) -> CancelOutcome {
        let taken = {
            let mut state = self.lock_state();
            if matches!(state.phase, Phase::CollectingRoleDetails { .. }) {
                let previous =
                    std::mem::replace(&mut state.phase, Phase::CollectingBasicInfo);
                state.pending.clear();
                match previous {
                    Phase::CollectingRoleDetails { account_id, role } => {
                        Some((account_id, role))
                    }
                    _ => None,
                }
            } else {
                None
            }
        };

        let Some((account_id, role)) = taken else {
            debug!(%reason, "nothing to cancel");
            return CancelOutcome::Ignored;
        };

        self.detach_cancel_listener();
        info!(%account_id, %reason, "registration abandoned, deleting half-registered account");

        match self.account.delete_account(&account_id, role).await {
            Ok(()) => CancelOutcome::Cancelled { compensated: true },
            Err(err) => {
                warn!(%account_id, error = %err,
                    "compensating delete failed; the backend may retain an orphaned account");
                CancelOutcome::Cancelled { compensated: false }
            }
        }
    }

    fn staged_teacher_assignments(&self) -> Vec<TeacherAssignment> {
        self.lock_state()
            .pending
            .iter()
            .filter_map(|entry| match &entry.detail {
                RoleDetail::Teacher(assignment) => Some(assignment.clone()),
                _ => None,
            })
            .collect()
    }

    fn staged_parent_links(&self) -> Vec<ParentLink> {
        self.lock_state()
            .pending
            .iter()
            .filter_map(|entry| match &entry.detail {
                RoleDetail::ParentLink(link) => Some(link.clone()),
                _ => None,
            })
            .collect()
    }

    /// Attach the cancellation listener for the vulnerable window. The task
    /// handles at most one signal; the phase check inside `cancel` keeps the
    /// compensation at-most-once even if several sources fire.
    fn attach_cancel_listener(&self) {
        let mut rx = self.signals.subscribe();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let weak = self.weak.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = rx.recv() => match received {
                        Ok(reason) => {
                            if let Some(wizard) = weak.upgrade() {
                                wizard.cancel(reason).await;
                            }
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "cancellation listener lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let mut slot = self.listener.lock().expect("listener slot lock poisoned");
        if let Some(previous) = slot.replace(ListenerHandle {
            shutdown: shutdown_tx,
            _task: task,
        }) {
            let _ = previous.shutdown.send(());
        }
    }

    /// Detach the cancellation listener on any transition out of phase 2.
    /// The listener may currently be running `cancel` on its own task, so
    /// this only signals shutdown and never joins.
    fn detach_cancel_listener(&self) {
        let handle = self
            .listener
            .lock()
            .expect("listener slot lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("wizard state lock poisoned")
    }
}

/// Validate a non-empty field.
fn require(field: &'static str, value: &str) -> WizardResult<()> {
    if value.trim().is_empty() {
        return Err(WizardError::invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Validate the phase-1 form before anything is sent.
fn validate_basic_info(form: &BasicInfoForm) -> WizardResult<()> {
    require("name", &form.name)?;
    require("email", &form.email)?;
    require("address", &form.address)?;
    require("birth_date", &form.birth_date)?;
    require("contact", &form.contact)?;
    require("username", &form.username)?;
    require("password", &form.password)?;
    require("password_confirmation", &form.password_confirmation)?;
    require("gender", &form.gender)?;

    if form.password != form.password_confirmation {
        return Err(WizardError::invalid(
            "password_confirmation",
            "password and confirmation do not match",
        ));
    }
    if !(3..=20).contains(&form.username.chars().count()) {
        return Err(WizardError::invalid(
            "username",
            "username must be 3-20 characters",
        ));
    }
    if form.password.chars().count() < 6 {
        return Err(WizardError::invalid(
            "password",
            "password must be at least 6 characters",
        ));
    }
    if !is_valid_email(&form.email) {
        return Err(WizardError::invalid("email", "invalid email format"));
    }

    Ok(())
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    !parts[0].is_empty() && parts[1].contains('.')
}

/// Validate a staged entry's sub-fields.
fn validate_detail(detail: &RoleDetail) -> WizardResult<()> {
    match detail {
        RoleDetail::Teacher(assignment) => {
            require("grade", &assignment.grade)?;
            require("class", &assignment.class)?;
            require("subject", &assignment.subject)?;
            require("medium", &assignment.medium)?;
        }
        RoleDetail::ParentLink(link) => {
            require("student_admission_no", &link.student_admission_no)?;
            require("profession", &link.profession)?;
            require("relation", &link.relation)?;
            require("contact", &link.contact)?;
        }
    }
    Ok(())
}

/// Validate the single student record.
fn validate_student_record(record: &StudentRecord) -> WizardResult<()> {
    require("admission_no", &record.admission_no)?;
    require("grade", &record.grade)?;
    require("class", &record.class)?;
    require("medium", &record.medium)?;
    require("guardian_contact", &record.guardian_contact)?;
    Ok(())
}

/// Exact-duplicate check across all fields of a staged entry. Teacher rows
/// compare the full (grade, class, subject, medium) tuple; parent rows are
/// duplicates only when admission number and relation both match.
fn is_duplicate(existing: &RoleDetail, candidate: &RoleDetail) -> bool {
    match (existing, candidate) {
        (RoleDetail::Teacher(a), RoleDetail::Teacher(b)) => a == b,
        (RoleDetail::ParentLink(a), RoleDetail::ParentLink(b)) => {
            a.student_admission_no == b.student_admission_no && a.relation == b.relation
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_form() -> BasicInfoForm {
        BasicInfoForm {
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
        }
    }

    fn assignment(grade: &str, class: &str, subject: &str, medium: &str) -> RoleDetail {
        RoleDetail::Teacher(TeacherAssignment {
            grade: grade.to_string(),
            class: class.to_string(),
            subject: subject.to_string(),
            medium: medium.to_string(),
        })
    }

    fn link(admission_no: &str, relation: &str) -> RoleDetail {
        RoleDetail::ParentLink(ParentLink {
            student_admission_no: admission_no.to_string(),
            profession: "Engineer".to_string(),
            relation: relation.to_string(),
            contact: "0770000000".to_string(),
        })
    }

    #[test]
    fn test_validate_basic_info_accepts_valid_form() {
        assert!(validate_basic_info(&basic_form()).is_ok());
    }

    #[test]
    fn test_validate_basic_info_password_mismatch() {
        let mut form = basic_form();
        form.password_confirmation = "different".to_string();
        let err = validate_basic_info(&form).unwrap_err();
        assert!(matches!(
            err,
            WizardError::Invalid {
                field: "password_confirmation",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_basic_info_username_length() {
        let mut form = basic_form();
        form.username = "ab".to_string();
        assert!(validate_basic_info(&form).is_err());

        form.username = "a".repeat(21);
        assert!(validate_basic_info(&form).is_err());

        form.username = "abc".to_string();
        assert!(validate_basic_info(&form).is_ok());
    }

    #[test]
    fn test_validate_basic_info_short_password() {
        let mut form = basic_form();
        form.password = "abc12".to_string();
        form.password_confirmation = "abc12".to_string();
        let err = validate_basic_info(&form).unwrap_err();
        assert!(matches!(err, WizardError::Invalid { field: "password", .. }));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@sub.domain.com"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_is_duplicate_teacher_full_tuple() {
        let a = assignment("Grade 8", "Araliya", "Mathematics", "English");
        let same = assignment("Grade 8", "Araliya", "Mathematics", "English");
        let other_medium = assignment("Grade 8", "Araliya", "Mathematics", "Sinhala");

        assert!(is_duplicate(&a, &same));
        assert!(!is_duplicate(&a, &other_medium));
    }

    #[test]
    fn test_is_duplicate_parent_requires_same_relation() {
        let mother = link("ADM-100", "Mother");
        let mother_again = link("ADM-100", "Mother");
        let father = link("ADM-100", "Father");

        assert!(is_duplicate(&mother, &mother_again));
        assert!(!is_duplicate(&mother, &father));
    }

    #[test]
    fn test_validate_detail_missing_field() {
        let incomplete = assignment("Grade 8", "", "Mathematics", "English");
        let err = validate_detail(&incomplete).unwrap_err();
        assert!(matches!(err, WizardError::Invalid { field: "class", .. }));
    }
}
