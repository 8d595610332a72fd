//! In-memory result storage with the service's per-item create/update rules.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{ErrorDetail, NewResult, ResultUpdate, TestResult};

pub const DEFAULT_WORKSPACE: &str = "8f2b4c1e-6d3a-4f0b-9c7e-2a5d1e0f3b6c";

#[derive(Debug)]
pub struct Store {
    results: Vec<TestResult>,
    workspaces: BTreeSet<String>,
    default_workspace: String,
    last_update: Option<DateTime<Utc>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_workspaces([DEFAULT_WORKSPACE])
    }
}

impl Store {
    /// A store that accepts only `workspaces`; the first one is the default
    /// for results created without a workspace.
    pub fn with_workspaces<I, S>(workspaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: Vec<String> = workspaces.into_iter().map(Into::into).collect();
        let default_workspace = ordered
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
        let mut known: BTreeSet<String> = ordered.into_iter().collect();
        known.insert(default_workspace.clone());
        Self {
            results: Vec::new(),
            workspaces: known,
            default_workspace,
            last_update: None,
        }
    }

    /// Results in creation order.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn get(&self, id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Next modification timestamp, strictly later than the previous one.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_update {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_update = Some(next);
        next
    }

    fn check_workspace(&self, workspace: &str) -> Result<(), ErrorDetail> {
        if self.workspaces.contains(workspace) {
            Ok(())
        } else {
            Err(ErrorDetail::workspace_not_found(workspace))
        }
    }

    pub fn create(&mut self, input: NewResult) -> Result<TestResult, ErrorDetail> {
        let workspace = input
            .workspace
            .clone()
            .unwrap_or_else(|| self.default_workspace.clone());
        self.check_workspace(&workspace)?;
        let result = TestResult {
            id: Uuid::new_v4().to_string(),
            program_name: input.program_name,
            status: input.status,
            started_at: input.started_at,
            updated_at: self.tick(),
            system_id: input.system_id,
            host_name: input.host_name,
            operator: input.operator,
            part_number: input.part_number,
            serial_number: input.serial_number,
            total_time_in_seconds: input.total_time_in_seconds,
            keywords: input.keywords.unwrap_or_default(),
            properties: input.properties.unwrap_or_default(),
            file_ids: input.file_ids.unwrap_or_default(),
            data_table_ids: input.data_table_ids.unwrap_or_default(),
            workspace,
        };
        self.results.push(result.clone());
        Ok(result)
    }

    /// Apply `input`. With `replace`, list and map fields are overwritten;
    /// otherwise new list entries are appended and map keys are merged.
    pub fn update(&mut self, input: &ResultUpdate, replace: bool) -> Result<TestResult, ErrorDetail> {
        let index = self
            .results
            .iter()
            .position(|r| r.id == input.id)
            .ok_or_else(|| ErrorDetail::result_not_found(&input.id))?;
        if let Some(workspace) = &input.workspace {
            self.check_workspace(workspace)?;
        }
        let updated_at = self.tick();
        let result = &mut self.results[index];

        if let Some(program_name) = &input.program_name {
            result.program_name = program_name.clone();
        }
        if let Some(status) = &input.status {
            result.status = status.clone();
        }
        set_if_present(&mut result.started_at, &input.started_at);
        set_if_present(&mut result.system_id, &input.system_id);
        set_if_present(&mut result.host_name, &input.host_name);
        set_if_present(&mut result.operator, &input.operator);
        set_if_present(&mut result.part_number, &input.part_number);
        set_if_present(&mut result.serial_number, &input.serial_number);
        set_if_present(&mut result.total_time_in_seconds, &input.total_time_in_seconds);
        if let Some(workspace) = &input.workspace {
            result.workspace = workspace.clone();
        }

        merge_list(&mut result.keywords, &input.keywords, replace);
        merge_list(&mut result.file_ids, &input.file_ids, replace);
        merge_list(&mut result.data_table_ids, &input.data_table_ids, replace);
        merge_map(&mut result.properties, &input.properties, replace);

        result.updated_at = updated_at;
        Ok(result.clone())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.results.iter().position(|r| r.id == id) {
            Some(index) => {
                self.results.remove(index);
                true
            }
            None => false,
        }
    }
}

fn set_if_present<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *target = Some(value.clone());
    }
}

fn merge_list(target: &mut Vec<String>, incoming: &Option<Vec<String>>, replace: bool) {
    let Some(items) = incoming else { return };
    if replace {
        *target = items.clone();
        return;
    }
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn merge_map(
    target: &mut BTreeMap<String, String>,
    incoming: &Option<BTreeMap<String, String>>,
    replace: bool,
) {
    let Some(entries) = incoming else { return };
    if replace {
        *target = entries.clone();
        return;
    }
    target.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
}
