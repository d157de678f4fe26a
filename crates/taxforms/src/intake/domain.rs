use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::documents::StoredDocument;
use super::sin::SinNumber;

/// Monetary answer. Stored as `NUMERIC(6, 2)`, so at most 9999.99.
pub type Money = Decimal;

/// Primary key of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

/// Primary key of a [`TaxForm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxFormId(pub u64);

/// Primary key of a dependent record, unique within its [`DependentKind`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependentId(pub u64);

/// Identifier issued by the external user-account provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserAccountId(pub String);

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Literal persisted in the database column.
            pub const fn value(self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            /// Human-readable label shown to applicants and staff.
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn values() -> Vec<&'static str> {
                Self::ALL.iter().map(|choice| choice.value()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.value())
            }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw {
                    $($value => Ok(Self::$variant),)+
                    other => Err(UnknownChoice {
                        field: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

choice_enum! {
    /// Lifecycle of a tax form. Advanced by staff workflow, not enforced here.
    FormStatus {
        Draft => ("draft", "Draft"),
        Submitted => ("submitted", "Submitted"),
        Confirmed => ("confirmed", "Confirmed"),
    }
}

choice_enum! {
    ApplyMethod {
        Online => ("online", "Online"),
        Office => ("office", "Office"),
    }
}

choice_enum! {
    MaritalStatus {
        Single => ("single", "Single"),
        Married => ("married", "Married"),
        Divorced => ("divorced", "Divorced"),
        Separated => ("separated", "Separated"),
        Widower => ("widower", "Widower"),
    }
}

choice_enum! {
    /// Whether the applicant paid or received support payments for an ex-spouse.
    SupportPaymentStatus {
        Pay => ("pay", "Pay"),
        Receive => ("receive", "Receive"),
        None => ("none", "None"),
    }
}

choice_enum! {
    /// Whether the applicant's children live with them all the time.
    ChildrenStatus {
        NotLivingWithYou => ("not_living_with_you", "No"),
        LivingWithYou => ("living_with_you", "Yes"),
        Shared => ("shared", "Shared"),
    }
}

impl Default for FormStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl Default for ApplyMethod {
    fn default() -> Self {
        Self::Online
    }
}

/// Raised when a literal does not belong to a choice set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{value}\" is not a valid {field}")]
pub struct UnknownChoice {
    pub field: &'static str,
    pub value: String,
}

/// Client identity as stored by the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub user: Option<UserAccountId>,
    pub phone_number: String,
    #[serde(skip_serializing, default)]
    pub otp: String,
}

/// Inbound payload for registering a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub phone_number: String,
    #[serde(default)]
    pub user: Option<UserAccountId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub sin_number: Option<SinNumber>,
    pub enter_canada_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub street_number: Option<String>,
    pub apartment_number: Option<String>,
    pub town: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaritalInfo {
    pub marital_status: Option<MaritalStatus>,
    pub marital_status_start_date: Option<NaiveDate>,
    pub support_payments_status: Option<SupportPaymentStatus>,
    pub payment_amount: Option<Money>,
    pub with_children: Option<bool>,
    pub children_status: Option<ChildrenStatus>,
}

/// Yes/no questions and family amounts from the "other questions" section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialAnswers {
    pub has_approved_disability: Option<bool>,
    pub medical_expenses: Option<Money>,
    pub donations: Option<Money>,
    pub activities: Option<Money>,
    pub rent_amount: Option<Money>,
    pub has_house: Option<bool>,
    pub property_tax_amount: Option<Money>,
    pub has_investment_income: Option<bool>,
    pub purchase_first_home: Option<bool>,
    pub work_from_home: Option<bool>,
}

/// Everything the applicant types into the form. Every section may be left empty while drafting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxFormAnswers {
    pub personal: PersonalInfo,
    pub contact: ContactInfo,
    pub marital: MaritalInfo,
    pub financial: FinancialAnswers,
}

/// One applicant's filing for a cycle, or a sub-form of another filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxForm {
    pub id: TaxFormId,
    pub client: Option<ClientId>,
    pub create_date: DateTime<Utc>,
    pub update_date: Option<DateTime<Utc>>,
    pub status: FormStatus,
    pub apply_method: ApplyMethod,
    pub is_sub_form: bool,
    pub basic_form: Option<TaxFormId>,
    pub answers: TaxFormAnswers,
    pub id_document: Option<StoredDocument>,
    pub void_check_document: Option<StoredDocument>,
}

impl TaxForm {
    pub const DOCUMENT_FIELDS: &'static [&'static str] = &["id_document", "void_check_document"];

    /// Canonical name of a document field, if the form has one called `field`.
    pub fn document_field(field: &str) -> Option<&'static str> {
        Self::DOCUMENT_FIELDS.iter().copied().find(|name| *name == field)
    }

    pub fn document_slot_mut(
        &mut self,
        field: &str,
    ) -> Option<(&'static str, &mut Option<StoredDocument>)> {
        match field {
            "id_document" => Some(("id_document", &mut self.id_document)),
            "void_check_document" => Some(("void_check_document", &mut self.void_check_document)),
            _ => None,
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = &StoredDocument> {
        self.id_document
            .iter()
            .chain(self.void_check_document.iter())
    }
}

/// Inbound payload for opening a new form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTaxForm {
    #[serde(default)]
    pub client: Option<ClientId>,
    #[serde(default)]
    pub apply_method: Option<ApplyMethod>,
    #[serde(default)]
    pub answers: TaxFormAnswers,
}

/// A child listed on the form (the `children` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub child_name: String,
    pub birth_date: NaiveDate,
    #[serde(default, skip_deserializing)]
    pub id_document: Option<StoredDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentClient {
    #[serde(default, skip_deserializing)]
    pub t4a_document: Option<StoredDocument>,
    #[serde(default, skip_deserializing)]
    pub t2202_document: Option<StoredDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployedClient {
    #[serde(default, skip_deserializing)]
    pub t4_document: Option<StoredDocument>,
}

/// Business details and monthly/annual expenses of a self-employed applicant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfEmployedClient {
    pub business_number: Option<String>,
    pub hst_access_code: String,
    pub fuel_expenses: Option<Money>,
    pub insurance_expenses: Option<Money>,
    pub car_repair_expenses: Option<Money>,
    pub meals_expenses: Option<Money>,
    pub new_car_expenses: Option<Money>,
    pub mobile_expenses: Option<Money>,
    pub other_expenses: Option<Money>,
    pub other_expenses_description: Option<String>,
    pub year_total_income: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeignIncomeClient {
    pub income_amount: Option<Money>,
}

/// A rental property and its expenses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalIncomeClient {
    pub ownership_percentage: Option<Decimal>,
    pub year_total_income: Option<Money>,
    pub street_number: Option<String>,
    pub apartment_number: Option<String>,
    pub town: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub legal_fees_expenses: Option<Money>,
    pub commission_expenses: Option<Money>,
    pub property_tax_expenses: Option<Money>,
    pub utilities_expenses: Option<Money>,
    pub repair_expenses: Option<Money>,
    pub insurance_expenses: Option<Money>,
    pub condo_fees_expenses: Option<Money>,
    pub other_expenses: Option<Money>,
    pub other_expenses_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernmentAssistanceClient {
    #[serde(default, skip_deserializing)]
    pub t5007_document: Option<StoredDocument>,
}

/// Which detail table a dependent record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Children,
    Student,
    Employed,
    SelfEmployed,
    ForeignIncome,
    RentalIncome,
    GovernmentAssistance,
}

impl DependentKind {
    pub const ALL: [DependentKind; 7] = [
        DependentKind::Children,
        DependentKind::Student,
        DependentKind::Employed,
        DependentKind::SelfEmployed,
        DependentKind::ForeignIncome,
        DependentKind::RentalIncome,
        DependentKind::GovernmentAssistance,
    ];

    /// Path segment and JSON tag.
    pub const fn slug(self) -> &'static str {
        match self {
            DependentKind::Children => "children",
            DependentKind::Student => "student",
            DependentKind::Employed => "employed",
            DependentKind::SelfEmployed => "self_employed",
            DependentKind::ForeignIncome => "foreign_income",
            DependentKind::RentalIncome => "rental_income",
            DependentKind::GovernmentAssistance => "government_assistance",
        }
    }

    pub const fn table_name(self) -> &'static str {
        match self {
            DependentKind::Children => "children",
            DependentKind::Student => "student_client",
            DependentKind::Employed => "employed_client",
            DependentKind::SelfEmployed => "self_employed_client",
            DependentKind::ForeignIncome => "foreign_income_client",
            DependentKind::RentalIncome => "rental_income_client",
            DependentKind::GovernmentAssistance => "government_assistance_client",
        }
    }

    pub const fn document_fields(self) -> &'static [&'static str] {
        match self {
            DependentKind::Children => &["id_document"],
            DependentKind::Student => &["t4a_document", "t2202_document"],
            DependentKind::Employed => &["t4_document"],
            DependentKind::GovernmentAssistance => &["t5007_document"],
            DependentKind::SelfEmployed
            | DependentKind::ForeignIncome
            | DependentKind::RentalIncome => &[],
        }
    }

    pub fn document_field(self, field: &str) -> Option<&'static str> {
        self.document_fields().iter().copied().find(|name| *name == field)
    }

    /// Only rental income rows may exist without a parent form.
    pub const fn requires_tax_form(self) -> bool {
        !matches!(self, DependentKind::RentalIncome)
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for DependentKind {
    type Err = UnknownChoice;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        DependentKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == raw)
            .ok_or_else(|| UnknownChoice {
                field: "DependentKind",
                value: raw.to_string(),
            })
    }
}

/// Payload of a dependent record, tagged by its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependentDetail {
    Children(Child),
    Student(StudentClient),
    Employed(EmployedClient),
    SelfEmployed(SelfEmployedClient),
    ForeignIncome(ForeignIncomeClient),
    RentalIncome(RentalIncomeClient),
    GovernmentAssistance(GovernmentAssistanceClient),
}

impl DependentDetail {
    pub fn kind(&self) -> DependentKind {
        match self {
            DependentDetail::Children(_) => DependentKind::Children,
            DependentDetail::Student(_) => DependentKind::Student,
            DependentDetail::Employed(_) => DependentKind::Employed,
            DependentDetail::SelfEmployed(_) => DependentKind::SelfEmployed,
            DependentDetail::ForeignIncome(_) => DependentKind::ForeignIncome,
            DependentDetail::RentalIncome(_) => DependentKind::RentalIncome,
            DependentDetail::GovernmentAssistance(_) => DependentKind::GovernmentAssistance,
        }
    }

    pub fn document_slot_mut(
        &mut self,
        field: &str,
    ) -> Option<(&'static str, &mut Option<StoredDocument>)> {
        match (self, field) {
            (DependentDetail::Children(child), "id_document") => {
                Some(("id_document", &mut child.id_document))
            }
            (DependentDetail::Student(student), "t4a_document") => {
                Some(("t4a_document", &mut student.t4a_document))
            }
            (DependentDetail::Student(student), "t2202_document") => {
                Some(("t2202_document", &mut student.t2202_document))
            }
            (DependentDetail::Employed(employed), "t4_document") => {
                Some(("t4_document", &mut employed.t4_document))
            }
            (DependentDetail::GovernmentAssistance(assistance), "t5007_document") => {
                Some(("t5007_document", &mut assistance.t5007_document))
            }
            _ => None,
        }
    }

    pub fn documents(&self) -> Vec<&StoredDocument> {
        let slots: Vec<&Option<StoredDocument>> = match self {
            DependentDetail::Children(child) => vec![&child.id_document],
            DependentDetail::Student(student) => {
                vec![&student.t4a_document, &student.t2202_document]
            }
            DependentDetail::Employed(employed) => vec![&employed.t4_document],
            DependentDetail::GovernmentAssistance(assistance) => vec![&assistance.t5007_document],
            DependentDetail::SelfEmployed(_)
            | DependentDetail::ForeignIncome(_)
            | DependentDetail::RentalIncome(_) => Vec::new(),
        };
        slots.into_iter().flatten().collect()
    }

    /// Copy stored documents from the previous version of the record.
    ///
    /// Documents only change through uploads, so an edit of the other fields keeps them.
    pub fn carry_documents_from(&mut self, previous: &DependentDetail) {
        match (self, previous) {
            (DependentDetail::Children(next), DependentDetail::Children(prev)) => {
                next.id_document = prev.id_document.clone();
            }
            (DependentDetail::Student(next), DependentDetail::Student(prev)) => {
                next.t4a_document = prev.t4a_document.clone();
                next.t2202_document = prev.t2202_document.clone();
            }
            (DependentDetail::Employed(next), DependentDetail::Employed(prev)) => {
                next.t4_document = prev.t4_document.clone();
            }
            (
                DependentDetail::GovernmentAssistance(next),
                DependentDetail::GovernmentAssistance(prev),
            ) => {
                next.t5007_document = prev.t5007_document.clone();
            }
            _ => {}
        }
    }
}
