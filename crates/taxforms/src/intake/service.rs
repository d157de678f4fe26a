use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::documents::{DocumentStorage, StorageError, StoredDocument, UploadedFile};
use super::domain::{
    ApplyMethod, Client, ClientId, DependentDetail, DependentId, DependentKind, FormStatus,
    NewClient, NewTaxForm, RentalIncomeClient, TaxForm, TaxFormAnswers, TaxFormId,
    UserAccountId,
};
use super::otp::{self, OtpDelivery, OtpError};
use super::repository::{
    self, CascadeReport, DependentRecord, IntakeRepository, RepositoryError, TaxFormRecord,
};
use super::sin::{CodecError, SinCodec};
use super::validators::{self, Validate, ValidationError};

/// Entry point for every intake write and read.
///
/// Validation runs before the store or the document storage is touched, and each write is a
/// single repository call, so a failure leaves no partial state behind and concurrent edits of
/// the same row never overwrite each other.
pub struct TaxFormService<R, S, D> {
    repository: Arc<R>,
    storage: Arc<S>,
    otp: Arc<D>,
    codec: Arc<dyn SinCodec>,
}

impl<R, S, D> TaxFormService<R, S, D>
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    pub fn new(
        repository: Arc<R>,
        storage: Arc<S>,
        otp: Arc<D>,
        codec: Arc<dyn SinCodec>,
    ) -> Self {
        Self {
            repository,
            storage,
            otp,
            codec,
        }
    }

    pub fn register_client(&self, request: NewClient) -> Result<Client, ServiceError> {
        validators::validate_phone_number(&request.phone_number)?;
        let code = otp::generate_code();
        validators::validate_otp(&code)?;

        let client = self.repository.insert_client(Client {
            id: ClientId(0),
            user: request.user,
            phone_number: request.phone_number,
            otp: code,
        })?;
        info!(client_id = client.id.0, "client registered");
        Ok(client)
    }

    pub fn update_phone(&self, id: ClientId, phone_number: String) -> Result<Client, ServiceError> {
        validators::validate_phone_number(&phone_number)?;
        let client = self.repository.modify_client(
            id,
            Box::new(|client: &mut Client| client.phone_number = phone_number),
        )?;
        Ok(client)
    }

    pub fn get_client(&self, id: ClientId) -> Result<Client, ServiceError> {
        self.repository
            .fetch_client(id)?
            .ok_or_else(|| RepositoryError::client_not_found(id).into())
    }

    pub fn client_for_user(&self, user: &UserAccountId) -> Result<Option<Client>, ServiceError> {
        Ok(self.repository.client_for_user(user)?)
    }

    /// Removes the client; its forms stay behind with no owner.
    pub fn delete_client(&self, id: ClientId) -> Result<Vec<TaxFormId>, ServiceError> {
        let detached = self.repository.delete_client(id)?;
        info!(client_id = id.0, orphaned_forms = detached.len(), "client deleted");
        Ok(detached)
    }

    /// Called when the account provider removes a user.
    pub fn user_account_deleted(
        &self,
        user: &UserAccountId,
    ) -> Result<Option<ClientId>, ServiceError> {
        let detached = self.repository.detach_user(user)?;
        if let Some(client) = detached {
            info!(client_id = client.0, "user account unlinked from client");
        }
        Ok(detached)
    }

    pub fn issue_otp(&self, id: ClientId) -> Result<(), ServiceError> {
        let code = otp::generate_code();
        let stored = code.clone();
        let client = self
            .repository
            .modify_client(id, Box::new(|client: &mut Client| client.otp = stored))?;
        self.otp.deliver(&client.phone_number, &code)?;
        Ok(())
    }

    /// Checks a code and rotates the stored one on success so it cannot be replayed.
    pub fn verify_otp(&self, id: ClientId, code: &str) -> Result<(), ServiceError> {
        let mut accepted = false;
        self.repository.modify_client(
            id,
            Box::new(|client: &mut Client| {
                accepted = !client.otp.is_empty() && client.otp == code;
                if accepted {
                    client.otp = otp::generate_code();
                }
            }),
        )?;
        if !accepted {
            warn!(client_id = id.0, "one-time password rejected");
            return Err(OtpError::InvalidCode.into());
        }
        Ok(())
    }

    /// Opens a draft form for a client.
    pub fn create_form(&self, request: NewTaxForm) -> Result<TaxForm, ServiceError> {
        request.answers.validate()?;
        let now = Utc::now();
        let form = TaxForm {
            id: TaxFormId(0),
            client: request.client,
            create_date: now,
            update_date: Some(now),
            status: FormStatus::default(),
            apply_method: request.apply_method.unwrap_or_default(),
            is_sub_form: false,
            basic_form: None,
            answers: request.answers,
            id_document: None,
            void_check_document: None,
        };
        let stored = self.insert_form(form)?;
        info!(tax_form_id = stored.id.0, "tax form created");
        Ok(stored)
    }

    /// Opens a sub-form that shares the basic form's client and apply method.
    pub fn create_sub_form(
        &self,
        basic_form: TaxFormId,
        answers: TaxFormAnswers,
    ) -> Result<TaxForm, ServiceError> {
        answers.validate()?;
        let basic = self.fetch_record(basic_form)?;
        let now = Utc::now();
        let form = TaxForm {
            id: TaxFormId(0),
            client: basic.form.client,
            create_date: now,
            update_date: Some(now),
            status: FormStatus::default(),
            apply_method: basic.form.apply_method,
            is_sub_form: true,
            basic_form: Some(basic_form),
            answers,
            id_document: None,
            void_check_document: None,
        };
        let stored = self.insert_form(form)?;
        info!(
            tax_form_id = stored.id.0,
            basic_form = basic_form.0,
            "sub-form created"
        );
        Ok(stored)
    }

    /// Replaces every answer section at once.
    pub fn update_answers(
        &self,
        id: TaxFormId,
        mut answers: TaxFormAnswers,
    ) -> Result<TaxForm, ServiceError> {
        answers.validate()?;
        let sealed_sin = repository::seal_sin(&mut answers, self.codec.as_ref())?;
        self.change_form(id, |record| {
            record.form.answers = answers;
            record.sealed_sin = sealed_sin;
        })
    }

    pub fn set_status(&self, id: TaxFormId, status: FormStatus) -> Result<TaxForm, ServiceError> {
        let form = self.change_form(id, |record| record.form.status = status)?;
        info!(tax_form_id = id.0, status = %status, "tax form status changed");
        Ok(form)
    }

    pub fn set_apply_method(
        &self,
        id: TaxFormId,
        apply_method: ApplyMethod,
    ) -> Result<TaxForm, ServiceError> {
        self.change_form(id, |record| record.form.apply_method = apply_method)
    }

    pub fn get_form(&self, id: TaxFormId) -> Result<TaxForm, ServiceError> {
        Ok(self.fetch_record(id)?.open(self.codec.as_ref())?)
    }

    pub fn forms_for_client(&self, client: ClientId) -> Result<Vec<TaxForm>, ServiceError> {
        self.get_client(client)?;
        self.open_all(self.repository.forms_for_client(client)?)
    }

    pub fn sub_forms(&self, basic_form: TaxFormId) -> Result<Vec<TaxForm>, ServiceError> {
        self.fetch_record(basic_form)?;
        self.open_all(self.repository.sub_forms(basic_form)?)
    }

    /// Deletes the form with its sub-forms and dependents, then releases their documents.
    pub fn delete_form(&self, id: TaxFormId) -> Result<CascadeReport, ServiceError> {
        let report = self.repository.delete_form(id)?;
        for record in &report.forms {
            record.form.documents().for_each(|doc| self.release(doc));
        }
        for record in &report.dependents {
            record.detail.documents().into_iter().for_each(|doc| self.release(doc));
        }
        info!(
            tax_form_id = id.0,
            forms = report.forms.len(),
            dependents = report.dependents.len(),
            "tax form deleted"
        );
        Ok(report)
    }

    /// Validates and stores an upload into one of the form's document fields.
    pub fn attach_form_document(
        &self,
        id: TaxFormId,
        field: &str,
        upload: UploadedFile,
    ) -> Result<TaxForm, ServiceError> {
        self.fetch_record(id)?;
        let field_name =
            TaxForm::document_field(field).ok_or_else(|| ServiceError::UnknownDocumentField {
                owner: "tax_form",
                field: field.to_string(),
            })?;
        validators::validate_upload(field_name, &upload)?;

        let stored = self.storage.save(&upload)?;
        let mut previous = None;
        let result = self.repository.modify_form(
            id,
            Box::new(|record: &mut TaxFormRecord| {
                if let Some((_, slot)) = record.form.document_slot_mut(field_name) {
                    previous = slot.replace(stored.clone());
                }
                record.form.update_date = Some(Utc::now());
            }),
        );
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                self.release(&stored);
                return Err(err.into());
            }
        };
        if let Some(previous) = previous {
            self.release(&previous);
        }
        info!(tax_form_id = id.0, field = field_name, size = stored.size, "document attached");
        Ok(record.open(self.codec.as_ref())?)
    }

    pub fn add_dependent(
        &self,
        form: TaxFormId,
        detail: DependentDetail,
    ) -> Result<DependentRecord, ServiceError> {
        self.insert_dependent(Some(form), detail)
    }

    /// Rental income is the one detail that may be recorded before any form exists.
    pub fn add_unlinked_rental_income(
        &self,
        detail: RentalIncomeClient,
    ) -> Result<DependentRecord, ServiceError> {
        self.insert_dependent(None, DependentDetail::RentalIncome(detail))
    }

    /// Replaces the editable fields of a dependent; stored documents are kept.
    pub fn update_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
        mut detail: DependentDetail,
    ) -> Result<DependentRecord, ServiceError> {
        ensure_kind(kind, &detail)?;
        detail.validate()?;
        let record = self.repository.modify_dependent(
            kind,
            id,
            Box::new(|record: &mut DependentRecord| {
                detail.carry_documents_from(&record.detail);
                record.detail = detail;
            }),
        )?;
        Ok(record)
    }

    pub fn get_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<DependentRecord, ServiceError> {
        self.repository
            .fetch_dependent(kind, id)?
            .ok_or_else(|| RepositoryError::dependent_not_found(kind, id).into())
    }

    pub fn dependents(
        &self,
        form: TaxFormId,
        kind: Option<DependentKind>,
    ) -> Result<Vec<DependentRecord>, ServiceError> {
        self.fetch_record(form)?;
        Ok(self.repository.dependents_of(form, kind)?)
    }

    pub fn delete_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<DependentRecord, ServiceError> {
        let record = self.repository.delete_dependent(kind, id)?;
        record
            .detail
            .documents()
            .into_iter()
            .for_each(|doc| self.release(doc));
        info!(kind = %kind, dependent_id = id.0, "dependent deleted");
        Ok(record)
    }

    pub fn attach_dependent_document(
        &self,
        kind: DependentKind,
        id: DependentId,
        field: &str,
        upload: UploadedFile,
    ) -> Result<DependentRecord, ServiceError> {
        self.get_dependent(kind, id)?;
        let field_name = kind
            .document_field(field)
            .ok_or_else(|| ServiceError::UnknownDocumentField {
                owner: kind.table_name(),
                field: field.to_string(),
            })?;
        validators::validate_upload(field_name, &upload)?;

        let stored = self.storage.save(&upload)?;
        let mut previous = None;
        let result = self.repository.modify_dependent(
            kind,
            id,
            Box::new(|record: &mut DependentRecord| {
                if let Some((_, slot)) = record.detail.document_slot_mut(field_name) {
                    previous = slot.replace(stored.clone());
                }
            }),
        );
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                self.release(&stored);
                return Err(err.into());
            }
        };
        if let Some(previous) = previous {
            self.release(&previous);
        }
        info!(kind = %kind, dependent_id = id.0, field = field_name, "document attached");
        Ok(record)
    }

    fn insert_dependent(
        &self,
        form: Option<TaxFormId>,
        detail: DependentDetail,
    ) -> Result<DependentRecord, ServiceError> {
        detail.validate()?;
        let record = self.repository.insert_dependent(DependentRecord {
            id: DependentId(0),
            tax_form: form,
            detail,
        })?;
        info!(
            kind = %record.kind(),
            dependent_id = record.id.0,
            tax_form_id = form.map(|form| form.0),
            "dependent added"
        );
        Ok(record)
    }

    fn insert_form(&self, form: TaxForm) -> Result<TaxForm, ServiceError> {
        let record = TaxFormRecord::seal(form, self.codec.as_ref())?;
        let stored = self.repository.insert_form(record)?;
        Ok(stored.open(self.codec.as_ref())?)
    }

    /// Applies `change` to the stored form and stamps `update_date`, in one repository write.
    fn change_form<'c>(
        &self,
        id: TaxFormId,
        change: impl FnOnce(&mut TaxFormRecord) + 'c,
    ) -> Result<TaxForm, ServiceError> {
        let record = self.repository.modify_form(
            id,
            Box::new(|record: &mut TaxFormRecord| {
                change(record);
                record.form.update_date = Some(Utc::now());
            }),
        )?;
        Ok(record.open(self.codec.as_ref())?)
    }

    fn fetch_record(&self, id: TaxFormId) -> Result<TaxFormRecord, ServiceError> {
        self.repository
            .fetch_form(id)?
            .ok_or_else(|| RepositoryError::form_not_found(id).into())
    }

    fn open_all(&self, records: Vec<TaxFormRecord>) -> Result<Vec<TaxForm>, ServiceError> {
        records
            .into_iter()
            .map(|record| record.open(self.codec.as_ref()).map_err(ServiceError::from))
            .collect()
    }

    /// Best effort: the record is already gone or updated, so a failure is only logged.
    fn release(&self, document: &StoredDocument) {
        if let Err(err) = self.storage.delete(&document.storage_key) {
            warn!(storage_key = %document.storage_key, error = %err, "failed to delete stored document");
        }
    }
}

fn ensure_kind(expected: DependentKind, detail: &DependentDetail) -> Result<(), ServiceError> {
    let found = detail.kind();
    if found == expected {
        Ok(())
    } else {
        Err(ServiceError::KindMismatch { expected, found })
    }
}

/// Error raised by the intake service. Every variant is scoped to the single failed operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error("{owner} has no document field named {field}")]
    UnknownDocumentField { owner: &'static str, field: String },
    #[error("payload describes a {found} record, expected {expected}")]
    KindMismatch {
        expected: DependentKind,
        found: DependentKind,
    },
}

impl ServiceError {
    pub(crate) fn kind_mismatch(expected: DependentKind, detail: &DependentDetail) -> Option<Self> {
        ensure_kind(expected, detail).err()
    }
}
