//! PostgreSQL DDL for the intake tables.
//!
//! Choice columns carry `CHECK` constraints with the lowercase literals from
//! [`domain`](super::domain), money columns are `NUMERIC(6, 2)`, and the foreign keys encode the
//! delete behavior the in-memory store implements: dependents and sub-forms cascade with their
//! tax form, while removing a client or user account only nulls the link.

use sea_query::{
    ColumnDef, ForeignKey, ForeignKeyAction, ForeignKeyCreateStatement, PostgresQueryBuilder,
    Table, TableCreateStatement,
};

use super::domain::{
    ApplyMethod, ChildrenStatus, DependentKind, FormStatus, MaritalStatus, SupportPaymentStatus,
};

/// Table owned by the account provider; only referenced here.
pub const USER_ACCOUNT_TABLE: &str = "user_account";
pub const CLIENT_TABLE: &str = "client";
pub const TAX_FORM_TABLE: &str = "tax_form";

const CHOICE_LEN: u32 = 128;

fn choice_check(column: &str, values: &[&str]) -> String {
    let literals = values
        .iter()
        .map(|value| format!("'{value}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CHECK ({column} IN ({literals}))")
}

fn id_column() -> ColumnDef {
    ColumnDef::new("id")
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn money(name: &'static str) -> ColumnDef {
    ColumnDef::new(name).decimal_len(6, 2).null().to_owned()
}

fn document(name: &'static str) -> ColumnDef {
    ColumnDef::new(name).string_len(100).null().to_owned()
}

fn optional_text(name: &'static str, len: u32) -> ColumnDef {
    ColumnDef::new(name).string_len(len).null().to_owned()
}

fn optional_flag(name: &'static str) -> ColumnDef {
    ColumnDef::new(name).boolean().null().to_owned()
}

fn optional_choice(name: &'static str, values: &[&str]) -> ColumnDef {
    ColumnDef::new(name)
        .string_len(CHOICE_LEN)
        .null()
        .extra(choice_check(name, values))
        .to_owned()
}

fn tax_form_link(table: &'static str, required: bool) -> (ColumnDef, ForeignKeyCreateStatement) {
    let mut column = ColumnDef::new("tax_form_id");
    column.big_integer();
    if required {
        column.not_null();
    } else {
        column.null();
    }
    let key = ForeignKey::create()
        .name(format!("fk_{table}_tax_form"))
        .from(table, "tax_form_id")
        .to(TAX_FORM_TABLE, "id")
        .on_delete(ForeignKeyAction::Cascade)
        .to_owned();
    (column, key)
}

fn user_account_table() -> TableCreateStatement {
    Table::create()
        .table(USER_ACCOUNT_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("id").string_len(150).not_null().primary_key())
        .to_owned()
}

fn client_table() -> TableCreateStatement {
    Table::create()
        .table(CLIENT_TABLE)
        .if_not_exists()
        .col(id_column())
        .col(
            ColumnDef::new("user_id")
                .string_len(150)
                .null()
                .unique_key(),
        )
        .col(
            ColumnDef::new("phone_number")
                .string_len(10)
                .not_null()
                .extra("CHECK (phone_number ~ '^[0-9]{10}$')"),
        )
        .col(ColumnDef::new("otp").string_len(10).not_null())
        .foreign_key(
            ForeignKey::create()
                .name("fk_client_user")
                .from(CLIENT_TABLE, "user_id")
                .to(USER_ACCOUNT_TABLE, "id")
                .on_delete(ForeignKeyAction::SetNull),
        )
        .to_owned()
}

fn tax_form_table() -> TableCreateStatement {
    let status_default = format!(
        "DEFAULT '{}' {}",
        FormStatus::default().value(),
        choice_check("status", &FormStatus::values())
    );
    let apply_method_default = format!(
        "DEFAULT '{}' {}",
        ApplyMethod::default().value(),
        choice_check("apply_method", &ApplyMethod::values())
    );

    Table::create()
        .table(TAX_FORM_TABLE)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new("client_id").big_integer().null())
        .col(
            ColumnDef::new("create_date")
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new("update_date")
                .timestamp_with_time_zone()
                .null(),
        )
        .col(
            ColumnDef::new("status")
                .string_len(CHOICE_LEN)
                .not_null()
                .extra(status_default),
        )
        .col(
            ColumnDef::new("apply_method")
                .string_len(CHOICE_LEN)
                .not_null()
                .extra(apply_method_default),
        )
        .col(
            ColumnDef::new("is_sub_form")
                .boolean()
                .not_null()
                .extra("DEFAULT FALSE"),
        )
        .col(ColumnDef::new("basic_form_id").big_integer().null())
        .col(ColumnDef::new("first_name").string_len(50).not_null().extra("DEFAULT ''"))
        .col(ColumnDef::new("last_name").string_len(50).not_null().extra("DEFAULT ''"))
        .col(ColumnDef::new("birth_date").date().null())
        .col(ColumnDef::new("sin_number").text().null())
        .col(ColumnDef::new("enter_canada_date").date().null())
        .col(optional_text("email", 254))
        .col(optional_text("street_number", 10))
        .col(optional_text("apartment_number", 10))
        .col(optional_text("town", 50))
        .col(optional_text("province", 50))
        .col(optional_text("postal_code", 50))
        .col(optional_choice("marital_status", &MaritalStatus::values()))
        .col(ColumnDef::new("marital_status_start_date").date().null())
        .col(optional_choice(
            "support_payments_status",
            &SupportPaymentStatus::values(),
        ))
        .col(money("payment_amount"))
        .col(optional_flag("with_children"))
        .col(optional_choice("children_status", &ChildrenStatus::values()))
        .col(optional_flag("has_approved_disability"))
        .col(money("medical_expenses"))
        .col(money("donations"))
        .col(money("activities"))
        .col(money("rent_amount"))
        .col(optional_flag("has_house"))
        .col(money("property_tax_amount"))
        .col(optional_flag("has_investment_income"))
        .col(optional_flag("purchase_first_home"))
        .col(optional_flag("work_from_home"))
        .col(document("id_document"))
        .col(document("void_check_document"))
        .foreign_key(
            ForeignKey::create()
                .name("fk_tax_form_client")
                .from(TAX_FORM_TABLE, "client_id")
                .to(CLIENT_TABLE, "id")
                .on_delete(ForeignKeyAction::SetNull),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_tax_form_basic_form")
                .from(TAX_FORM_TABLE, "basic_form_id")
                .to(TAX_FORM_TABLE, "id")
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_owned()
}

fn dependent_table(kind: DependentKind) -> TableCreateStatement {
    let name = kind.table_name();
    let (link, mut key) = tax_form_link(name, kind.requires_tax_form());

    let mut table = Table::create();
    table.table(name).if_not_exists().col(id_column()).col(link);

    let columns: Vec<ColumnDef> = match kind {
        DependentKind::Children => vec![
            ColumnDef::new("child_name")
                .string_len(50)
                .not_null()
                .extra("CHECK (child_name <> '')")
                .to_owned(),
            ColumnDef::new("birth_date").date().not_null().to_owned(),
            document("id_document"),
        ],
        DependentKind::Student => vec![document("t4a_document"), document("t2202_document")],
        DependentKind::Employed => vec![document("t4_document")],
        DependentKind::SelfEmployed => vec![
            ColumnDef::new("business_number").string().null().to_owned(),
            ColumnDef::new("hst_access_code").string().not_null().to_owned(),
            money("fuel_expenses"),
            money("insurance_expenses"),
            money("car_repair_expenses"),
            money("meals_expenses"),
            money("new_car_expenses"),
            money("mobile_expenses"),
            money("other_expenses"),
            ColumnDef::new("other_expenses_description").text().null().to_owned(),
            money("year_total_income"),
        ],
        DependentKind::ForeignIncome => vec![money("income_amount")],
        DependentKind::RentalIncome => vec![
            money("ownership_percentage"),
            money("year_total_income"),
            optional_text("street_number", 10),
            optional_text("apartment_number", 10),
            optional_text("town", 10),
            optional_text("province", 10),
            optional_text("postal_code", 10),
            money("legal_fees_expenses"),
            money("commission_expenses"),
            money("property_tax_expenses"),
            money("utilities_expenses"),
            money("repair_expenses"),
            money("insurance_expenses"),
            money("condo_fees_expenses"),
            money("other_expenses"),
            ColumnDef::new("other_expenses_description").text().null().to_owned(),
        ],
        DependentKind::GovernmentAssistance => vec![document("t5007_document")],
    };

    for column in columns {
        table.col(column);
    }
    table.foreign_key(&mut key);
    table.to_owned()
}

/// Create statements in dependency order.
pub fn create_table_statements() -> Vec<TableCreateStatement> {
    let mut statements = vec![user_account_table(), client_table(), tax_form_table()];
    statements.extend(DependentKind::ALL.into_iter().map(dependent_table));
    statements
}

/// Full schema as one SQL script.
pub fn schema_sql() -> String {
    create_table_statements()
        .iter()
        .map(|statement| format!("{};", statement.build(PostgresQueryBuilder)))
        .collect::<Vec<_>>()
        .join("\n\n")
}
