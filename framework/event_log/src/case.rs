use crate::EventRow;
use std::collections::HashMap;

/// All rows sharing one `case_id`, in their original relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub id: String,
    pub rows: Vec<EventRow>,
}

/// Rows partitioned by case.
///
/// Cases are kept in the order their id was first seen in the input, and rows within a case keep
/// their input order. Nothing ever moves a row between cases.
#[derive(Debug, Clone, Default)]
pub struct CaseIndex {
    cases: Vec<Case>,
    positions: HashMap<String, usize>,
}

impl CaseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: EventRow) {
        match self.positions.get(row.case_id()) {
            Some(&position) => self.cases[position].rows.push(row),
            None => {
                let id = row.case_id().to_string();
                self.positions.insert(id.clone(), self.cases.len());
                self.cases.push(Case {
                    id,
                    rows: vec![row],
                });
            }
        }
    }

    pub fn get(&self, case_id: &str) -> Option<&Case> {
        self.positions
            .get(case_id)
            .map(|&position| &self.cases[position])
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Case> {
        self.cases.iter()
    }

    pub fn case_ids(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(|case| case.id.as_str())
    }

    /// Flatten back to a row sequence, case by case.
    pub fn into_rows(self) -> Vec<EventRow> {
        self.cases.into_iter().flat_map(|case| case.rows).collect()
    }
}

impl FromIterator<EventRow> for CaseIndex {
    fn from_iter<T: IntoIterator<Item = EventRow>>(iter: T) -> Self {
        let mut index = CaseIndex::new();
        for row in iter {
            index.push(row);
        }
        index
    }
}

impl IntoIterator for CaseIndex {
    type Item = Case;
    type IntoIter = std::vec::IntoIter<Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.into_iter()
    }
}

pub fn group_by_case(rows: impl IntoIterator<Item = EventRow>) -> CaseIndex {
    rows.into_iter().collect()
}
