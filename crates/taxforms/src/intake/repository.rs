use serde::{Deserialize, Serialize};

use super::domain::{
    Client, ClientId, DependentDetail, DependentId, DependentKind, TaxForm, TaxFormAnswers,
    TaxFormId, UserAccountId,
};
use super::sin::{CodecError, SealedSin, SinCodec};

/// Tax form as persisted: the SIN is only present in sealed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxFormRecord {
    pub form: TaxForm,
    pub sealed_sin: Option<SealedSin>,
}

impl TaxFormRecord {
    /// Move the plaintext SIN out of `form` and seal it.
    pub fn seal(mut form: TaxForm, codec: &dyn SinCodec) -> Result<Self, CodecError> {
        let sealed_sin = seal_sin(&mut form.answers, codec)?;
        Ok(Self { form, sealed_sin })
    }

    pub fn open(self, codec: &dyn SinCodec) -> Result<TaxForm, CodecError> {
        let mut form = self.form;
        form.answers.personal.sin_number = self
            .sealed_sin
            .as_ref()
            .map(|sealed| codec.open(sealed))
            .transpose()?;
        Ok(form)
    }

    pub fn id(&self) -> TaxFormId {
        self.form.id
    }
}

/// Take the plaintext SIN out of `answers`, sealing it unless it was left blank.
pub fn seal_sin(
    answers: &mut TaxFormAnswers,
    codec: &dyn SinCodec,
) -> Result<Option<SealedSin>, CodecError> {
    answers
        .personal
        .sin_number
        .take()
        .filter(|sin| !sin.is_blank())
        .map(|sin| codec.seal(&sin))
        .transpose()
}

/// Row of one of the dependent tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub id: DependentId,
    pub tax_form: Option<TaxFormId>,
    pub detail: DependentDetail,
}

impl DependentRecord {
    pub fn kind(&self) -> DependentKind {
        self.detail.kind()
    }
}

/// Everything removed by a tax form delete, so callers can release stored documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeReport {
    pub forms: Vec<TaxFormRecord>,
    pub dependents: Vec<DependentRecord>,
}

/// Edit applied to a stored row inside the repository's transaction.
pub type Change<'a, T> = Box<dyn FnOnce(&mut T) + 'a>;

/// Storage abstraction for the intake tables.
///
/// Inserts ignore the identifier on the incoming value and return the stored copy with the one
/// the store assigned. Every method is one transaction: either all of its effects are visible
/// or none are. `modify_*` reads the row, applies the change, and writes it back without any
/// other write in between; the row's identifier cannot be changed through them.
pub trait IntakeRepository: Send + Sync {
    fn insert_client(&self, client: Client) -> Result<Client, RepositoryError>;
    fn modify_client(
        &self,
        id: ClientId,
        change: Change<'_, Client>,
    ) -> Result<Client, RepositoryError>;
    fn fetch_client(&self, id: ClientId) -> Result<Option<Client>, RepositoryError>;
    fn client_for_user(&self, user: &UserAccountId) -> Result<Option<Client>, RepositoryError>;
    /// Removes the client and nulls `client` on its forms, returning the forms it touched.
    fn delete_client(&self, id: ClientId) -> Result<Vec<TaxFormId>, RepositoryError>;
    /// Nulls the user link after the account is deleted upstream.
    fn detach_user(&self, user: &UserAccountId) -> Result<Option<ClientId>, RepositoryError>;

    fn insert_form(&self, record: TaxFormRecord) -> Result<TaxFormRecord, RepositoryError>;
    fn modify_form(
        &self,
        id: TaxFormId,
        change: Change<'_, TaxFormRecord>,
    ) -> Result<TaxFormRecord, RepositoryError>;
    fn fetch_form(&self, id: TaxFormId) -> Result<Option<TaxFormRecord>, RepositoryError>;
    fn forms_for_client(&self, client: ClientId) -> Result<Vec<TaxFormRecord>, RepositoryError>;
    fn sub_forms(&self, basic_form: TaxFormId) -> Result<Vec<TaxFormRecord>, RepositoryError>;
    /// Removes the form, its sub-forms, and every dependent row hanging off any of them.
    fn delete_form(&self, id: TaxFormId) -> Result<CascadeReport, RepositoryError>;

    fn insert_dependent(&self, record: DependentRecord)
        -> Result<DependentRecord, RepositoryError>;
    fn modify_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
        change: Change<'_, DependentRecord>,
    ) -> Result<DependentRecord, RepositoryError>;
    fn fetch_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<Option<DependentRecord>, RepositoryError>;
    fn dependents_of(
        &self,
        form: TaxFormId,
        kind: Option<DependentKind>,
    ) -> Result<Vec<DependentRecord>, RepositoryError>;
    fn delete_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<DependentRecord, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("user account {0} is already linked to a client")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{field} references missing {entity} {id}")]
    InvalidReference {
        field: &'static str,
        entity: &'static str,
        id: String,
    },
    #[error("{entity} {id} cannot change its {field}")]
    Immutable {
        entity: &'static str,
        id: String,
        field: &'static str,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn client_not_found(id: ClientId) -> Self {
        Self::NotFound {
            entity: "client",
            id: id.0.to_string(),
        }
    }

    pub fn form_not_found(id: TaxFormId) -> Self {
        Self::NotFound {
            entity: "tax form",
            id: id.0.to_string(),
        }
    }

    pub fn dependent_not_found(kind: DependentKind, id: DependentId) -> Self {
        Self::NotFound {
            entity: kind.table_name(),
            id: id.0.to_string(),
        }
    }
}
