use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Client, ClientId, DependentId, DependentKind, TaxFormId, UserAccountId,
};
use super::repository::{
    CascadeReport, Change, DependentRecord, IntakeRepository, RepositoryError, TaxFormRecord,
};

#[derive(Default)]
struct Tables {
    clients: BTreeMap<ClientId, Client>,
    forms: BTreeMap<TaxFormId, TaxFormRecord>,
    dependents: BTreeMap<(DependentKind, DependentId), DependentRecord>,
    next_client: u64,
    next_form: u64,
    next_dependent: BTreeMap<DependentKind, u64>,
}

impl Tables {
    fn allocate_client(&mut self) -> ClientId {
        self.next_client += 1;
        ClientId(self.next_client)
    }

    fn allocate_form(&mut self) -> TaxFormId {
        self.next_form += 1;
        TaxFormId(self.next_form)
    }

    fn allocate_dependent(&mut self, kind: DependentKind) -> DependentId {
        let next = self.next_dependent.entry(kind).or_insert(0);
        *next += 1;
        DependentId(*next)
    }

    fn check_client_reference(&self, client: Option<ClientId>) -> Result<(), RepositoryError> {
        match client {
            Some(id) if !self.clients.contains_key(&id) => Err(RepositoryError::InvalidReference {
                field: "client",
                entity: "client",
                id: id.0.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_form_reference(
        &self,
        field: &'static str,
        form: Option<TaxFormId>,
    ) -> Result<(), RepositoryError> {
        match form {
            Some(id) if !self.forms.contains_key(&id) => Err(RepositoryError::InvalidReference {
                field,
                entity: "tax form",
                id: id.0.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_user_unique(
        &self,
        user: Option<&UserAccountId>,
        owner: Option<ClientId>,
    ) -> Result<(), RepositoryError> {
        let Some(user) = user else {
            return Ok(());
        };
        let taken = self
            .clients
            .values()
            .any(|client| client.user.as_ref() == Some(user) && Some(client.id) != owner);
        if taken {
            Err(RepositoryError::Conflict(user.0.clone()))
        } else {
            Ok(())
        }
    }

    /// The form plus every form below it through `basic_form`.
    fn form_subtree(&self, root: TaxFormId) -> BTreeSet<TaxFormId> {
        let mut collected = BTreeSet::from([root]);
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            for record in self.forms.values() {
                if record.form.basic_form == Some(parent) && collected.insert(record.id()) {
                    frontier.push(record.id());
                }
            }
        }
        collected
    }
}

/// Reference store behind a single mutex, so every write and cascade is atomic.
#[derive(Default, Clone)]
pub struct InMemoryIntakeStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryIntakeStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("repository mutex poisoned")
    }

    pub fn dependent_count(&self) -> usize {
        self.tables().dependents.len()
    }

    pub fn form_count(&self) -> usize {
        self.tables().forms.len()
    }
}

impl IntakeRepository for InMemoryIntakeStore {
    fn insert_client(&self, mut client: Client) -> Result<Client, RepositoryError> {
        let mut tables = self.tables();
        tables.check_user_unique(client.user.as_ref(), None)?;
        client.id = tables.allocate_client();
        tables.clients.insert(client.id, client.clone());
        Ok(client)
    }

    fn modify_client(
        &self,
        id: ClientId,
        change: Change<'_, Client>,
    ) -> Result<Client, RepositoryError> {
        let mut tables = self.tables();
        let mut client = tables
            .clients
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::client_not_found(id))?;
        change(&mut client);
        client.id = id;
        tables.check_user_unique(client.user.as_ref(), Some(id))?;
        tables.clients.insert(id, client.clone());
        Ok(client)
    }

    fn fetch_client(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.tables().clients.get(&id).cloned())
    }

    fn client_for_user(&self, user: &UserAccountId) -> Result<Option<Client>, RepositoryError> {
        Ok(self
            .tables()
            .clients
            .values()
            .find(|client| client.user.as_ref() == Some(user))
            .cloned())
    }

    fn delete_client(&self, id: ClientId) -> Result<Vec<TaxFormId>, RepositoryError> {
        let mut tables = self.tables();
        if tables.clients.remove(&id).is_none() {
            return Err(RepositoryError::client_not_found(id));
        }

        let mut detached = Vec::new();
        for record in tables.forms.values_mut() {
            if record.form.client == Some(id) {
                record.form.client = None;
                detached.push(record.id());
            }
        }
        Ok(detached)
    }

    fn detach_user(&self, user: &UserAccountId) -> Result<Option<ClientId>, RepositoryError> {
        let mut tables = self.tables();
        let client = tables
            .clients
            .values_mut()
            .find(|client| client.user.as_ref() == Some(user));
        Ok(client.map(|client| {
            client.user = None;
            client.id
        }))
    }

    fn insert_form(&self, mut record: TaxFormRecord) -> Result<TaxFormRecord, RepositoryError> {
        let mut tables = self.tables();
        tables.check_client_reference(record.form.client)?;
        tables.check_form_reference("basic_form", record.form.basic_form)?;
        record.form.id = tables.allocate_form();
        tables.forms.insert(record.id(), record.clone());
        Ok(record)
    }

    fn modify_form(
        &self,
        id: TaxFormId,
        change: Change<'_, TaxFormRecord>,
    ) -> Result<TaxFormRecord, RepositoryError> {
        let mut tables = self.tables();
        let mut record = tables
            .forms
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::form_not_found(id))?;
        change(&mut record);
        record.form.id = id;
        tables.check_client_reference(record.form.client)?;
        tables.check_form_reference("basic_form", record.form.basic_form)?;
        tables.forms.insert(id, record.clone());
        Ok(record)
    }

    fn fetch_form(&self, id: TaxFormId) -> Result<Option<TaxFormRecord>, RepositoryError> {
        Ok(self.tables().forms.get(&id).cloned())
    }

    fn forms_for_client(&self, client: ClientId) -> Result<Vec<TaxFormRecord>, RepositoryError> {
        Ok(self
            .tables()
            .forms
            .values()
            .filter(|record| record.form.client == Some(client))
            .cloned()
            .collect())
    }

    fn sub_forms(&self, basic_form: TaxFormId) -> Result<Vec<TaxFormRecord>, RepositoryError> {
        Ok(self
            .tables()
            .forms
            .values()
            .filter(|record| record.form.basic_form == Some(basic_form))
            .cloned()
            .collect())
    }

    fn delete_form(&self, id: TaxFormId) -> Result<CascadeReport, RepositoryError> {
        let mut tables = self.tables();
        if !tables.forms.contains_key(&id) {
            return Err(RepositoryError::form_not_found(id));
        }

        let doomed = tables.form_subtree(id);
        let mut report = CascadeReport::default();

        let dependent_keys: Vec<_> = tables
            .dependents
            .iter()
            .filter(|(_, record)| {
                record
                    .tax_form
                    .map(|form| doomed.contains(&form))
                    .unwrap_or(false)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in dependent_keys {
            if let Some(record) = tables.dependents.remove(&key) {
                report.dependents.push(record);
            }
        }

        for form_id in doomed {
            if let Some(record) = tables.forms.remove(&form_id) {
                report.forms.push(record);
            }
        }

        Ok(report)
    }

    fn insert_dependent(
        &self,
        mut record: DependentRecord,
    ) -> Result<DependentRecord, RepositoryError> {
        let mut tables = self.tables();
        let kind = record.kind();
        if record.tax_form.is_none() && kind.requires_tax_form() {
            return Err(RepositoryError::InvalidReference {
                field: "tax_form",
                entity: "tax form",
                id: "null".to_string(),
            });
        }
        tables.check_form_reference("tax_form", record.tax_form)?;
        record.id = tables.allocate_dependent(kind);
        tables.dependents.insert((kind, record.id), record.clone());
        Ok(record)
    }

    fn modify_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
        change: Change<'_, DependentRecord>,
    ) -> Result<DependentRecord, RepositoryError> {
        let mut tables = self.tables();
        let mut record = tables
            .dependents
            .get(&(kind, id))
            .cloned()
            .ok_or_else(|| RepositoryError::dependent_not_found(kind, id))?;
        change(&mut record);
        record.id = id;
        if record.kind() != kind {
            return Err(RepositoryError::Immutable {
                entity: kind.table_name(),
                id: id.0.to_string(),
                field: "kind",
            });
        }
        if record.tax_form.is_none() && kind.requires_tax_form() {
            return Err(RepositoryError::InvalidReference {
                field: "tax_form",
                entity: "tax form",
                id: "null".to_string(),
            });
        }
        tables.check_form_reference("tax_form", record.tax_form)?;
        tables.dependents.insert((kind, id), record.clone());
        Ok(record)
    }

    fn fetch_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<Option<DependentRecord>, RepositoryError> {
        Ok(self.tables().dependents.get(&(kind, id)).cloned())
    }

    fn dependents_of(
        &self,
        form: TaxFormId,
        kind: Option<DependentKind>,
    ) -> Result<Vec<DependentRecord>, RepositoryError> {
        Ok(self
            .tables()
            .dependents
            .values()
            .filter(|record| record.tax_form == Some(form))
            .filter(|record| kind.map(|kind| record.kind() == kind).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn delete_dependent(
        &self,
        kind: DependentKind,
        id: DependentId,
    ) -> Result<DependentRecord, RepositoryError> {
        self.tables()
            .dependents
            .remove(&(kind, id))
            .ok_or_else(|| RepositoryError::dependent_not_found(kind, id))
    }
}
