//! Field rules enforced on every write.
//!
//! Each check borrows its input and either passes or returns the first [`ValidationError`]
//! found. The [`Validate`] implementations walk a whole record in field order.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use super::documents::UploadedFile;
use super::domain::{
    Child, ContactInfo, DependentDetail, FinancialAnswers, MaritalInfo, PersonalInfo,
    RentalIncomeClient, SelfEmployedClient, TaxFormAnswers,
};

/// Upload ceiling: 4 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 4 * 1024 * 1024;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

pub const MONEY_MAX_DIGITS: u32 = 6;
pub const MONEY_DECIMAL_PLACES: u32 = 2;

pub const OTP_MAX_LENGTH: usize = 10;

static SIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{9}$").expect("SIN pattern compiles"));
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern compiles"));
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: File size must be no more than 4 MB.")]
    FileTooLarge { field: &'static str, size: u64 },
    #[error(
        "{field}: File extension \u{201c}{extension}\u{201d} is not allowed. Allowed extensions are: pdf, png, jpg, jpeg."
    )]
    DisallowedExtension {
        field: &'static str,
        extension: String,
    },
    #[error("{field}: The submitted file is empty.")]
    EmptyFile { field: &'static str },
    #[error("SIN number must be exactly 9 digits.")]
    InvalidSin,
    #[error("Phone number must be exactly 10 digits.")]
    InvalidPhoneNumber,
    #[error("{field}: Enter a valid email address.")]
    InvalidEmail { field: &'static str },
    #[error("{field}: This field cannot be blank.")]
    Blank { field: &'static str },
    #[error("{field}: Ensure this value has at most {max} characters (it has {found}).")]
    TooLong {
        field: &'static str,
        max: usize,
        found: usize,
    },
    #[error("{field}: Ensure that there are no more than {max} digits in total.")]
    TooManyDigits { field: &'static str, max: u32 },
    #[error("{field}: Ensure that there are no more than {max} decimal places.")]
    TooManyDecimalPlaces { field: &'static str, max: u32 },
    #[error("{field}: Ensure that there are no more than {max} digits before the decimal point.")]
    TooManyWholeDigits { field: &'static str, max: u32 },
}

/// Lower-cased extension of the final path component, empty when there is none.
///
/// A leading dot marks a hidden file rather than an extension, so `.pdf` has no extension.
pub fn file_extension(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    match base.rsplit_once('.') {
        Some((stem, extension)) if !stem.trim_start_matches('.').is_empty() => {
            extension.to_ascii_lowercase()
        }
        _ => String::new(),
    }
}

pub fn validate_file_extension(field: &'static str, file_name: &str) -> Result<(), ValidationError> {
    let extension = file_extension(file_name);
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::DisallowedExtension { field, extension })
    }
}

pub fn validate_file_size(field: &'static str, size: u64) -> Result<(), ValidationError> {
    if size > MAX_UPLOAD_BYTES {
        Err(ValidationError::FileTooLarge { field, size })
    } else {
        Ok(())
    }
}

/// Upload rules in their declared order: non-empty, extension, then size.
pub fn validate_upload(field: &'static str, upload: &UploadedFile) -> Result<(), ValidationError> {
    if upload.bytes.is_empty() {
        return Err(ValidationError::EmptyFile { field });
    }
    validate_file_extension(field, &upload.file_name)?;
    validate_file_size(field, upload.size())
}

pub fn validate_sin(value: &str) -> Result<(), ValidationError> {
    if SIN_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSin)
    }
}

pub fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    if PHONE_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhoneNumber)
    }
}

pub fn validate_email(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if EMAIL_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail { field })
    }
}

pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(())
    }
}

/// Length in characters, not bytes.
pub fn validate_max_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let found = value.chars().count();
    if found > max {
        Err(ValidationError::TooLong { field, max, found })
    } else {
        Ok(())
    }
}

fn validate_optional_length(
    field: &'static str,
    value: &Option<String>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) => validate_max_length(field, value, max),
        None => Ok(()),
    }
}

/// `NUMERIC(6, 2)` rule: at most six significant digits, two of them after the point.
///
/// Trailing zeros count, so `1.500` is rejected for having three decimal places.
pub fn validate_money(field: &'static str, value: &Decimal) -> Result<(), ValidationError> {
    let decimals = value.scale();
    let significant = value.mantissa().unsigned_abs().to_string().len() as u32;
    let digits = significant.max(decimals);
    let whole_digits = digits - decimals;

    if digits > MONEY_MAX_DIGITS {
        return Err(ValidationError::TooManyDigits {
            field,
            max: MONEY_MAX_DIGITS,
        });
    }
    if decimals > MONEY_DECIMAL_PLACES {
        return Err(ValidationError::TooManyDecimalPlaces {
            field,
            max: MONEY_DECIMAL_PLACES,
        });
    }
    if whole_digits > MONEY_MAX_DIGITS - MONEY_DECIMAL_PLACES {
        return Err(ValidationError::TooManyWholeDigits {
            field,
            max: MONEY_MAX_DIGITS - MONEY_DECIMAL_PLACES,
        });
    }
    Ok(())
}

fn validate_amounts(amounts: &[(&'static str, &Option<Decimal>)]) -> Result<(), ValidationError> {
    for &(field, amount) in amounts {
        if let Some(amount) = amount {
            validate_money(field, amount)?;
        }
    }
    Ok(())
}

pub fn validate_otp(value: &str) -> Result<(), ValidationError> {
    validate_required("otp", value)?;
    validate_max_length("otp", value, OTP_MAX_LENGTH)
}

/// Whole-record validation.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for PersonalInfo {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_max_length("first_name", &self.first_name, 50)?;
        validate_max_length("last_name", &self.last_name, 50)?;
        if let Some(sin) = self.sin_number.as_ref().filter(|sin| !sin.is_blank()) {
            validate_sin(sin.as_str())?;
        }
        Ok(())
    }
}

impl Validate for ContactInfo {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(email) = self.email.as_deref().filter(|email| !email.is_empty()) {
            validate_max_length("email", email, 254)?;
            validate_email("email", email)?;
        }
        validate_optional_length("street_number", &self.street_number, 10)?;
        validate_optional_length("apartment_number", &self.apartment_number, 10)?;
        validate_optional_length("town", &self.town, 50)?;
        validate_optional_length("province", &self.province, 50)?;
        validate_optional_length("postal_code", &self.postal_code, 50)
    }
}

impl Validate for MaritalInfo {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_amounts(&[("payment_amount", &self.payment_amount)])
    }
}

impl Validate for FinancialAnswers {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_amounts(&[
            ("medical_expenses", &self.medical_expenses),
            ("donations", &self.donations),
            ("activities", &self.activities),
            ("rent_amount", &self.rent_amount),
            ("property_tax_amount", &self.property_tax_amount),
        ])
    }
}

impl Validate for TaxFormAnswers {
    fn validate(&self) -> Result<(), ValidationError> {
        self.personal.validate()?;
        self.contact.validate()?;
        self.marital.validate()?;
        self.financial.validate()
    }
}

impl Validate for Child {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("child_name", &self.child_name)?;
        validate_max_length("child_name", &self.child_name, 50)
    }
}

impl Validate for SelfEmployedClient {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("hst_access_code", &self.hst_access_code)?;
        validate_amounts(&[
            ("fuel_expenses", &self.fuel_expenses),
            ("insurance_expenses", &self.insurance_expenses),
            ("car_repair_expenses", &self.car_repair_expenses),
            ("meals_expenses", &self.meals_expenses),
            ("new_car_expenses", &self.new_car_expenses),
            ("mobile_expenses", &self.mobile_expenses),
            ("other_expenses", &self.other_expenses),
            ("year_total_income", &self.year_total_income),
        ])
    }
}

impl Validate for RentalIncomeClient {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_amounts(&[
            ("ownership_percentage", &self.ownership_percentage),
            ("year_total_income", &self.year_total_income),
        ])?;
        validate_optional_length("street_number", &self.street_number, 10)?;
        validate_optional_length("apartment_number", &self.apartment_number, 10)?;
        validate_optional_length("town", &self.town, 10)?;
        validate_optional_length("province", &self.province, 10)?;
        validate_optional_length("postal_code", &self.postal_code, 10)?;
        validate_amounts(&[
            ("legal_fees_expenses", &self.legal_fees_expenses),
            ("commission_expenses", &self.commission_expenses),
            ("property_tax_expenses", &self.property_tax_expenses),
            ("utilities_expenses", &self.utilities_expenses),
            ("repair_expenses", &self.repair_expenses),
            ("insurance_expenses", &self.insurance_expenses),
            ("condo_fees_expenses", &self.condo_fees_expenses),
            ("other_expenses", &self.other_expenses),
        ])
    }
}

impl Validate for DependentDetail {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DependentDetail::Children(child) => child.validate(),
            DependentDetail::SelfEmployed(detail) => detail.validate(),
            DependentDetail::ForeignIncome(detail) => {
                validate_amounts(&[("income_amount", &detail.income_amount)])
            }
            DependentDetail::RentalIncome(detail) => detail.validate(),
            DependentDetail::Student(_)
            | DependentDetail::Employed(_)
            | DependentDetail::GovernmentAssistance(_) => Ok(()),
        }
    }
}
