//! Import configuration: which resource lands in which table, and how its
//! Romanian CSV headers map to column names.
//!
//! The map is process-wide and immutable. A resource name missing from it
//! fails the import job; nothing is skipped silently.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug)]
pub struct ImportConfig {
    /// Destination table name.
    pub table: &'static str,
    /// Staging table prefix; a random number is appended per import.
    pub staging_prefix: &'static str,
    /// Lowercased CSV header -> column name.
    pub columns: HashMap<&'static str, &'static str>,
}

pub static IMPORT_CONFIGS: Lazy<HashMap<&'static str, ImportConfig>> = Lazy::new(|| {
    HashMap::from([
        (
            "N_VERSIUNE_CAEN.CSV",
            ImportConfig {
                table: "caen_versions",
                staging_prefix: "caen_versions",
                columns: HashMap::from([("cod", "code"), ("descriere", "description")]),
            },
        ),
        (
            "N_CAEN.CSV",
            ImportConfig {
                table: "caen_codes",
                staging_prefix: "caen_codes",
                columns: HashMap::from([
                    ("sectiunea", "section"),
                    ("subsectiunea", "subsection"),
                    ("diviziunea", "division"),
                    ("grupa", "group"),
                    ("clasa", "class"),
                    ("denumire", "name"),
                    ("versiune_caen", "caen_version"),
                ]),
            },
        ),
        (
            "N_STARE_FIRMA.CSV",
            ImportConfig {
                table: "company_statuses",
                staging_prefix: "company_statuses",
                columns: HashMap::from([("cod", "code"), ("denumire", "name")]),
            },
        ),
        (
            "OD_FIRME.CSV",
            ImportConfig {
                table: "companies",
                staging_prefix: "companies",
                columns: HashMap::from([
                    ("denumire", "name"),
                    ("cui", "tax_id"),
                    ("cod_inmatriculare", "registration_code"),
                    ("data_inmatriculare", "registration_date"),
                    ("euid", "euid"),
                    ("forma_juridica", "legal_form"),
                    ("adr_tara", "country"),
                    ("adr_judet", "county"),
                    ("adr_localitate", "locality"),
                    ("adr_den_strada", "street_name"),
                    ("adr_nr_strada", "street_number"),
                    ("adr_bloc", "building"),
                    ("adr_scara", "staircase"),
                    ("adr_etaj", "floor"),
                    ("adr_apartament", "apartment"),
                    ("adr_cod_postal", "postal_code"),
                    ("adr_sector", "sector"),
                    ("adr_completare", "address_details"),
                    ("web", "website"),
                    ("tara_firma_mama", "parent_company_country"),
                ]),
            },
        ),
        (
            "OD_CAEN_AUTORIZAT.CSV",
            ImportConfig {
                table: "authorized_activities",
                staging_prefix: "authorized_activities",
                columns: HashMap::from([
                    ("cod_inmatriculare", "registration_code"),
                    ("cod_caen_autorizat", "authorized_caen_code"),
                    ("ver_caen_autorizat", "caen_version"),
                ]),
            },
        ),
        (
            "OD_STARE_FIRMA.CSV",
            ImportConfig {
                table: "company_status_history",
                staging_prefix: "company_status_history",
                columns: HashMap::from([
                    ("cod_inmatriculare", "registration_code"),
                    ("cod", "status_code"),
                ]),
            },
        ),
        (
            "OD_REPREZENTANTI_LEGALI.CSV",
            ImportConfig {
                table: "legal_representatives",
                staging_prefix: "legal_representatives",
                columns: HashMap::from([
                    ("cod_inmatriculare", "registration_code"),
                    ("persoana_imputernicita", "authorized_person"),
                    ("calitate", "role"),
                    ("data_nastere", "birth_date"),
                    ("localitate_nastere", "birth_locality"),
                    ("judet_nastere", "birth_county"),
                    ("tara_nastere", "birth_country"),
                    ("localitate", "locality"),
                    ("judet", "county"),
                    ("tara", "country"),
                ]),
            },
        ),
        (
            "OD_REPREZENTANTI_IF.CSV",
            ImportConfig {
                table: "family_business_representatives",
                staging_prefix: "family_business_representatives",
                columns: HashMap::from([
                    ("cod_inmatriculare", "registration_code"),
                    ("nume", "name"),
                    ("data_nastere", "birth_date"),
                    ("localitate_nastere", "birth_locality"),
                    ("judet_nastere", "birth_county"),
                    ("tara_nastere", "birth_country"),
                    ("calitate", "role"),
                ]),
            },
        ),
        (
            "OD_SUCURSALE_ALTE_STATE_MEMBRE.CSV",
            ImportConfig {
                table: "foreign_branches",
                staging_prefix: "foreign_branches",
                columns: HashMap::from([
                    ("cod_inmatriculare", "registration_code"),
                    ("tip_unitate", "unit_type"),
                    ("denumire_sucursala", "branch_name"),
                    ("euid", "euid"),
                    ("cod_fiscal", "tax_code"),
                    ("tara", "country"),
                ]),
            },
        ),
    ])
});

/// Look up the import configuration for a resource name.
pub fn import_config(resource_name: &str) -> Option<&'static ImportConfig> {
    IMPORT_CONFIGS.get(resource_name)
}

/// Dependency tier of a resource, by name.
///
/// Imports run tier by tier: nomenclature tables first, then CAEN codes,
/// then companies, then everything that references companies. Names without
/// a tier of their own land in tier 4; if they also lack an import
/// configuration the import job fails there.
pub fn import_tier(resource_name: &str) -> u8 {
    match resource_name {
        "N_VERSIUNE_CAEN.CSV" | "N_STARE_FIRMA.CSV" => 1,
        "N_CAEN.CSV" => 2,
        "OD_FIRME.CSV" => 3,
        _ => 4,
    }
}
