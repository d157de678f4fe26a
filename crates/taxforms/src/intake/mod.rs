//! Client tax-form intake: the applicant's client identity, the tax form itself, and the seven
//! kinds of dependent detail records hanging off a form.
//!
//! Everything goes through [`TaxFormService`], which validates input, seals the SIN before it
//! reaches an [`IntakeRepository`], and hands accepted uploads to a [`DocumentStorage`].

pub mod documents;
pub mod domain;
pub mod memory;
pub mod otp;
pub mod repository;
pub mod router;
pub mod schema;
pub mod service;
pub mod sin;
pub mod validators;

#[cfg(test)]
mod tests;

pub use documents::{
    DocumentStorage, FilesystemDocumentStorage, InMemoryDocumentStorage, StorageError,
    StoredDocument, UploadedFile,
};
pub use domain::{
    ApplyMethod, Child, ChildrenStatus, Client, ClientId, ContactInfo, DependentDetail,
    DependentId, DependentKind, EmployedClient, FinancialAnswers, ForeignIncomeClient, FormStatus,
    GovernmentAssistanceClient, MaritalInfo, MaritalStatus, Money, NewClient, NewTaxForm,
    PersonalInfo, RentalIncomeClient, SelfEmployedClient, StudentClient, SupportPaymentStatus,
    TaxForm, TaxFormAnswers, TaxFormId, UserAccountId,
};
pub use memory::InMemoryIntakeStore;
pub use otp::{LoggingOtpDelivery, OtpDelivery, OtpError};
pub use repository::{
    CascadeReport, Change, DependentRecord, IntakeRepository, RepositoryError, TaxFormRecord,
};
pub use router::intake_router;
pub use service::{ServiceError, TaxFormService};
pub use sin::{AesGcmSinCodec, CodecError, SealedSin, SinCodec, SinNumber};
pub use validators::{Validate, ValidationError};
