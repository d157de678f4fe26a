use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;

use crate::intake::documents::{DocumentStorage, StorageError, StoredDocument, UploadedFile};
use crate::intake::domain::{
    Child, Client, DependentDetail, EmployedClient, ForeignIncomeClient,
    GovernmentAssistanceClient, NewClient, NewTaxForm, PersonalInfo, RentalIncomeClient,
    SelfEmployedClient, StudentClient, TaxForm, TaxFormAnswers, UserAccountId,
};
use crate::intake::otp::{OtpDelivery, OtpError};
use crate::intake::sin::{AesGcmSinCodec, SinNumber};
use crate::intake::{intake_router, InMemoryDocumentStorage, InMemoryIntakeStore, TaxFormService};

pub(super) const MIB: usize = 1024 * 1024;

/// Records every code instead of sending it.
#[derive(Default, Clone)]
pub(super) struct MemoryOtp {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryOtp {
    pub(super) fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .expect("otp mutex poisoned")
            .last()
            .map(|(_, code)| code.clone())
    }

    pub(super) fn deliveries(&self) -> usize {
        self.sent.lock().expect("otp mutex poisoned").len()
    }
}

impl OtpDelivery for MemoryOtp {
    fn deliver(&self, phone_number: &str, code: &str) -> Result<(), OtpError> {
        self.sent
            .lock()
            .expect("otp mutex poisoned")
            .push((phone_number.to_string(), code.to_string()));
        Ok(())
    }
}

/// Storage backend that is always down.
pub(super) struct UnavailableStorage;

impl DocumentStorage for UnavailableStorage {
    fn save(&self, _upload: &UploadedFile) -> Result<StoredDocument, StorageError> {
        Err(StorageError::Unavailable("bucket offline".to_string()))
    }

    fn delete(&self, _storage_key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("bucket offline".to_string()))
    }
}

pub(super) type TestService = TaxFormService<InMemoryIntakeStore, InMemoryDocumentStorage, MemoryOtp>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: InMemoryIntakeStore,
    pub(super) storage: InMemoryDocumentStorage,
    pub(super) otp: MemoryOtp,
}

pub(super) fn harness() -> Harness {
    let store = InMemoryIntakeStore::default();
    let storage = InMemoryDocumentStorage::default();
    let otp = MemoryOtp::default();
    let service = Arc::new(TaxFormService::new(
        Arc::new(store.clone()),
        Arc::new(storage.clone()),
        Arc::new(otp.clone()),
        Arc::new(AesGcmSinCodec::ephemeral()),
    ));
    Harness {
        service,
        store,
        storage,
        otp,
    }
}

pub(super) fn router(harness: &Harness) -> Router {
    intake_router(harness.service.clone())
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn new_client(user: Option<&str>) -> NewClient {
    NewClient {
        phone_number: "4165551234".to_string(),
        user: user.map(|user| UserAccountId(user.to_string())),
    }
}

pub(super) fn registered_client(service: &TestService) -> Client {
    service
        .register_client(new_client(None))
        .expect("client registers")
}

pub(super) fn answers_with_sin(sin: &str) -> TaxFormAnswers {
    TaxFormAnswers {
        personal: PersonalInfo {
            first_name: "Amira".to_string(),
            last_name: "Haddad".to_string(),
            birth_date: Some(date(1988, 3, 14)),
            sin_number: Some(SinNumber::new(sin)),
            enter_canada_date: Some(date(2015, 9, 1)),
        },
        ..TaxFormAnswers::default()
    }
}

pub(super) fn draft_form(service: &TestService, client: &Client) -> TaxForm {
    service
        .create_form(NewTaxForm {
            client: Some(client.id),
            apply_method: None,
            answers: answers_with_sin("123456789"),
        })
        .expect("form created")
}

pub(super) fn upload(file_name: &str, size: usize) -> UploadedFile {
    UploadedFile::new(file_name, vec![0u8; size])
}

pub(super) fn child(name: &str) -> DependentDetail {
    DependentDetail::Children(Child {
        child_name: name.to_string(),
        birth_date: date(2016, 4, 2),
        id_document: None,
    })
}

pub(super) fn one_of_each_dependent() -> Vec<DependentDetail> {
    vec![
        child("Mina"),
        DependentDetail::Student(StudentClient::default()),
        DependentDetail::Employed(EmployedClient::default()),
        DependentDetail::SelfEmployed(SelfEmployedClient {
            hst_access_code: "HST-4471".to_string(),
            fuel_expenses: Some("120.50".parse().expect("decimal")),
            ..SelfEmployedClient::default()
        }),
        DependentDetail::ForeignIncome(ForeignIncomeClient {
            income_amount: Some("2500.00".parse().expect("decimal")),
        }),
        DependentDetail::RentalIncome(RentalIncomeClient {
            town: Some("Oakville".to_string()),
            ..RentalIncomeClient::default()
        }),
        DependentDetail::GovernmentAssistance(GovernmentAssistanceClient::default()),
    ]
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
