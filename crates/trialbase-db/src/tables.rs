//! Static table specs for the trial and drug aggregates.
//!
//! One [`TableSpec`] per aggregate table, mirroring the migration schema.
//! These whitelists are the only place column names are declared; the record
//! store refuses everything else.

use crate::records::{ColumnKind, TableSpec};

use ColumnKind::{Bool, Date, Int, Jsonb, Text, TextArray, Uuid};

// =========================================================================
// TRIAL AGGREGATE
// =========================================================================

pub static TRIAL_OVERVIEW: TableSpec = TableSpec {
    table: "trial_overview",
    parent_fk: None,
    columns: &[
        ("therapeutic_area", Text),
        ("trial_id", Text),
        ("trial_identifier", TextArray),
        ("trial_phase", Text),
        ("status", Text),
        ("primary_drugs", Text),
        ("other_drugs", Text),
        ("title", Text),
        ("disease_type", Text),
        ("patient_segment", Text),
        ("line_of_therapy", Text),
        ("reference_links", TextArray),
        ("trial_tags", Text),
        ("sponsor_collaborators", Text),
        ("sponsor_field_activity", Text),
        ("associated_cro", Text),
        ("countries", Text),
        ("region", Text),
        ("trial_record_status", Text),
    ],
    has_timestamps: true,
};

pub static TRIAL_OUTCOME_MEASURED: TableSpec = TableSpec {
    table: "trial_outcome_measured",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("purpose_of_trial", Text),
        ("summary", Text),
        ("primary_outcome_measure", Text),
        ("other_outcome_measure", Text),
        ("study_design_keywords", Text),
        ("study_design", Text),
        ("treatment_regimen", Text),
        ("number_of_arms", Int),
    ],
    has_timestamps: false,
};

pub static TRIAL_PARTICIPATION_CRITERIA: TableSpec = TableSpec {
    table: "trial_participation_criteria",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("inclusion_criteria", Text),
        ("exclusion_criteria", Text),
        ("subject_type", Text),
        ("age_from", Text),
        ("age_to", Text),
        ("sex", Text),
        ("healthy_volunteers", Text),
        ("target_no_volunteers", Text),
        ("actual_enrolled_volunteers", Text),
    ],
    has_timestamps: false,
};

pub static TRIAL_TIMING: TableSpec = TableSpec {
    table: "trial_timing",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("start_date_actual", Date),
        ("start_date_benchmark", Date),
        ("start_date_estimated", Date),
        ("inclusion_period_actual", Text),
        ("inclusion_period_benchmark", Text),
        ("inclusion_period_estimated", Text),
        ("enrollment_closed_actual", Date),
        ("enrollment_closed_benchmark", Date),
        ("enrollment_closed_estimated", Date),
        ("primary_outcome_duration_actual", Text),
        ("primary_outcome_duration_benchmark", Text),
        ("primary_outcome_duration_estimated", Text),
        ("trial_end_date_actual", Date),
        ("trial_end_date_benchmark", Date),
        ("trial_end_date_estimated", Date),
        ("result_duration_actual", Text),
        ("result_duration_benchmark", Text),
        ("result_duration_estimated", Text),
        ("result_published_date_actual", Date),
        ("result_published_date_benchmark", Date),
        ("result_published_date_estimated", Date),
    ],
    has_timestamps: false,
};

pub static TRIAL_RESULTS: TableSpec = TableSpec {
    table: "trial_results",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("trial_outcome", Text),
        ("reference", Text),
        ("trial_results", TextArray),
        ("adverse_event_reported", Text),
        ("adverse_event_type", Text),
        ("treatment_for_adverse_events", Text),
        ("results_available", Text),
        ("endpoints_met", Text),
        ("trial_outcome_content", Text),
        ("trial_outcome_link", Text),
        ("trial_outcome_attachment", Text),
        ("site_notes", Jsonb),
    ],
    has_timestamps: false,
};

pub static TRIAL_SITES: TableSpec = TableSpec {
    table: "trial_sites",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("total", Int),
        ("notes", Text),
        ("study_sites", TextArray),
        ("principal_investigators", TextArray),
        ("site_status", Text),
        ("site_countries", TextArray),
        ("site_regions", TextArray),
        ("site_contact_info", TextArray),
        ("site_notes", Jsonb),
    ],
    has_timestamps: false,
};

pub static TRIAL_OTHER_SOURCES: TableSpec = TableSpec {
    table: "trial_other_sources",
    parent_fk: Some("trial_id"),
    columns: &[("trial_id", Uuid), ("data", Text)],
    has_timestamps: false,
};

pub static TRIAL_LOGS: TableSpec = TableSpec {
    table: "trial_logs",
    parent_fk: Some("trial_id"),
    columns: &[
        ("trial_id", Uuid),
        ("trial_changes_log", Text),
        ("trial_added_date", Date),
        ("last_modified_date", Date),
        ("last_modified_user", Text),
        ("full_review_user", Text),
        ("next_review_date", Date),
        ("internal_note", Text),
        ("attachment", Text),
    ],
    has_timestamps: false,
};

pub static TRIAL_NOTES: TableSpec = TableSpec {
    table: "trial_notes",
    parent_fk: Some("trial_id"),
    columns: &[("trial_id", Uuid), ("notes", Jsonb)],
    has_timestamps: false,
};

/// Trial child tables in aggregate processing order, keyed by the payload
/// section name the aggregate endpoints accept.
pub static TRIAL_CHILDREN: &[(&str, &TableSpec)] = &[
    ("outcome_measured", &TRIAL_OUTCOME_MEASURED),
    ("participation_criteria", &TRIAL_PARTICIPATION_CRITERIA),
    ("timing", &TRIAL_TIMING),
    ("results", &TRIAL_RESULTS),
    ("sites", &TRIAL_SITES),
    ("other_sources", &TRIAL_OTHER_SOURCES),
    ("logs", &TRIAL_LOGS),
    ("notes", &TRIAL_NOTES),
];

/// Overview fields the intake normalizer coerces into `TEXT[]`.
pub static TRIAL_ARRAY_FIELDS: &[&str] = &["trial_identifier", "reference_links"];

/// Overview fields the intake normalizer coerces into plain text.
pub static TRIAL_STRING_FIELDS: &[&str] = &[
    "therapeutic_area",
    "trial_phase",
    "status",
    "primary_drugs",
    "other_drugs",
    "title",
    "disease_type",
    "patient_segment",
    "line_of_therapy",
    "trial_tags",
    "sponsor_collaborators",
    "sponsor_field_activity",
    "associated_cro",
    "countries",
    "region",
    "trial_record_status",
];

// =========================================================================
// DRUG AGGREGATE
// =========================================================================

pub static DRUG_OVERVIEW: TableSpec = TableSpec {
    table: "drug_overview",
    parent_fk: None,
    columns: &[
        ("drug_name", Text),
        ("generic_name", Text),
        ("other_name", Text),
        ("primary_name", Text),
        ("global_status", Text),
        ("development_status", Text),
        ("drug_summary", Text),
        ("originator", Text),
        ("other_active_companies", Text),
        ("therapeutic_area", Text),
        ("disease_type", Text),
        ("regulator_designations", Text),
        ("source_link", Text),
        ("drug_record_status", Text),
        ("is_approved", Bool),
    ],
    has_timestamps: true,
};

pub static DRUG_DEV_STATUS: TableSpec = TableSpec {
    table: "drug_dev_status",
    parent_fk: Some("drug_over_id"),
    columns: &[
        ("drug_over_id", Uuid),
        ("disease_type", Text),
        ("therapeutic_class", Text),
        ("company", Text),
        ("company_type", Text),
        ("status", Text),
        ("reference", Jsonb),
    ],
    has_timestamps: false,
};

pub static DRUG_ACTIVITY: TableSpec = TableSpec {
    table: "drug_activity",
    parent_fk: Some("drug_over_id"),
    columns: &[
        ("drug_over_id", Uuid),
        ("mechanism_of_action", Text),
        ("biological_target", Text),
        ("drug_technology", Text),
        ("delivery_route", Text),
        ("delivery_medium", Text),
    ],
    has_timestamps: false,
};

pub static DRUG_DEVELOPMENT: TableSpec = TableSpec {
    table: "drug_development",
    parent_fk: Some("drug_over_id"),
    columns: &[
        ("drug_over_id", Uuid),
        ("preclinical", Text),
        ("trial_id", Text),
        ("title", Text),
        ("primary_drugs", Text),
        ("status", Text),
        ("sponsor", Text),
    ],
    has_timestamps: false,
};

pub static DRUG_OTHER_SOURCES: TableSpec = TableSpec {
    table: "drug_other_sources",
    parent_fk: Some("drug_over_id"),
    columns: &[("drug_over_id", Uuid), ("data", Text)],
    has_timestamps: false,
};

pub static DRUG_LICENCES_MARKETING: TableSpec = TableSpec {
    table: "drug_licences_marketing",
    parent_fk: Some("drug_over_id"),
    columns: &[
        ("drug_over_id", Uuid),
        ("agreement", Text),
        ("licensing_availability", Text),
        ("marketing_approvals", Text),
    ],
    has_timestamps: false,
};

pub static DRUG_LOGS: TableSpec = TableSpec {
    table: "drug_logs",
    parent_fk: Some("drug_over_id"),
    columns: &[
        ("drug_over_id", Uuid),
        ("drug_changes_log", Text),
        ("created_date", Date),
        ("last_modified_user", Text),
        ("full_review_user", Text),
        ("next_review_date", Date),
        ("notes", Text),
    ],
    has_timestamps: false,
};

/// Drug child tables in aggregate processing order.
pub static DRUG_CHILDREN: &[(&str, &TableSpec)] = &[
    ("dev_status", &DRUG_DEV_STATUS),
    ("activity", &DRUG_ACTIVITY),
    ("development", &DRUG_DEVELOPMENT),
    ("other_sources", &DRUG_OTHER_SOURCES),
    ("licences_marketing", &DRUG_LICENCES_MARKETING),
    ("logs", &DRUG_LOGS),
];

/// Drug overview fields the intake normalizer coerces into plain text.
pub static DRUG_STRING_FIELDS: &[&str] = &[
    "drug_name",
    "generic_name",
    "other_name",
    "primary_name",
    "global_status",
    "development_status",
    "drug_summary",
    "originator",
    "other_active_companies",
    "therapeutic_area",
    "disease_type",
    "regulator_designations",
    "source_link",
    "drug_record_status",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_child_spec_declares_its_parent_fk_column() {
        for (name, spec) in TRIAL_CHILDREN.iter().chain(DRUG_CHILDREN) {
            let fk = spec.parent_fk.unwrap_or_else(|| {
                panic!("child spec `{name}` must declare a parent fk")
            });
            assert!(
                spec.columns.iter().any(|(col, _)| *col == fk),
                "child spec `{name}` must whitelist its fk column `{fk}`"
            );
        }
    }

    #[test]
    fn test_roots_have_no_parent_fk() {
        assert!(TRIAL_OVERVIEW.parent_fk.is_none());
        assert!(DRUG_OVERVIEW.parent_fk.is_none());
        assert!(TRIAL_OVERVIEW.has_timestamps);
        assert!(DRUG_OVERVIEW.has_timestamps);
    }

    #[test]
    fn test_trial_array_fields_are_whitelisted_as_arrays() {
        for field in TRIAL_ARRAY_FIELDS {
            let kind = TRIAL_OVERVIEW
                .columns
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, kind)| *kind);
            assert_eq!(kind, Some(ColumnKind::TextArray), "field: {field}");
        }
    }

    #[test]
    fn test_section_keys_are_unique() {
        for children in [TRIAL_CHILDREN, DRUG_CHILDREN] {
            let mut keys: Vec<&str> = children.iter().map(|(k, _)| *k).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), children.len());
        }
    }
}
