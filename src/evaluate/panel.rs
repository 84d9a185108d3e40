use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One cell of a provider panel; `None` marks a data gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelPoint {
    pub date: NaiveDate,
    pub instrument: String,
    pub value: Option<f64>,
}

impl PanelPoint {
    pub fn new(date: NaiveDate, instrument: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            instrument: instrument.into(),
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub date: NaiveDate,
    pub instrument: String,
    pub factor: f64,
    pub label: f64,
}

/// Factor and label values joined on (date, instrument), rows with a
/// missing or non-finite side dropped, sorted by date then instrument.
#[derive(Debug, Clone, Default)]
pub struct MergedPanel {
    rows: Vec<MergedRow>,
}

impl MergedPanel {
    pub fn merge(factor: &[PanelPoint], label: &[PanelPoint]) -> Self {
        let labels: HashMap<(NaiveDate, &str), f64> = label
            .iter()
            .filter_map(|p| match p.value {
                Some(v) if v.is_finite() => Some(((p.date, p.instrument.as_str()), v)),
                _ => None,
            })
            .collect();

        let mut rows: Vec<MergedRow> = factor
            .iter()
            .filter_map(|p| {
                let f = p.value.filter(|v| v.is_finite())?;
                let l = labels.get(&(p.date, p.instrument.as_str()))?;
                Some(MergedRow {
                    date: p.date,
                    instrument: p.instrument.clone(),
                    factor: f,
                    label: *l,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.instrument.cmp(&b.instrument)));
        rows.dedup_by(|a, b| a.date == b.date && a.instrument == b.instrument);
        Self { rows }
    }

    pub fn from_rows(mut rows: Vec<MergedRow>) -> Self {
        rows.retain(|r| r.factor.is_finite() && r.label.is_finite());
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.instrument.cmp(&b.instrument)));
        Self { rows }
    }

    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Cross-sections in date order.
    pub fn by_date(&self) -> BTreeMap<NaiveDate, Vec<&MergedRow>> {
        let mut out: BTreeMap<NaiveDate, Vec<&MergedRow>> = BTreeMap::new();
        for row in &self.rows {
            out.entry(row.date).or_default().push(row);
        }
        out
    }
}
