use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use clingest::app::App;
use clingest::clinical::{BatchResponse, ClinicalClient};
use clingest::config::{Config, ConfigLoader};
use clingest::drs::{DrsClient, DrsObject, VerifyOutcome};
use clingest::error::IngestError;
use clingest::linker::{FileRef, GenomicManifestEntry, GenomicMetadata, SampleLink};
use clingest::partition::{ClinicalSubmission, ProgramGate};
use clingest::report::IngestOutcome;

/// Clinical store that accepts everything, with an optional per-program
/// deny list for the authorization gate.
#[derive(Default)]
struct MockClinical {
    denied: Vec<String>,
    posts: Mutex<Vec<(String, usize)>>,
    deleted: Mutex<Vec<String>>,
}

impl ClinicalClient for MockClinical {
    fn post_batch(
        &self,
        entity: &str,
        records: &[Map<String, Value>],
    ) -> Result<BatchResponse, IngestError> {
        self.posts
            .lock()
            .unwrap()
            .push((entity.to_string(), records.len()));
        Ok(BatchResponse {
            status: 201,
            body: String::new(),
        })
    }

    fn program_is_authorized(&self, program_id: &str) -> Result<bool, IngestError> {
        Ok(!self.denied.iter().any(|denied| denied == program_id))
    }

    fn delete_program(&self, program_id: &str) -> Result<BatchResponse, IngestError> {
        self.deleted.lock().unwrap().push(program_id.to_string());
        Ok(BatchResponse {
            status: 204,
            body: String::new(),
        })
    }
}

impl ProgramGate for MockClinical {
    fn is_authorized(&self, program_id: &str) -> Result<bool, IngestError> {
        self.program_is_authorized(program_id)
    }
}

/// In-memory DRS store with post-as-upsert semantics.
#[derive(Default)]
struct MockDrs {
    objects: Mutex<HashMap<String, DrsObject>>,
}

impl DrsClient for MockDrs {
    fn get_object(&self, id: &str) -> Result<Option<DrsObject>, IngestError> {
        Ok(self.objects.lock().unwrap().get(id).cloned())
    }

    fn post_object(&self, object: &DrsObject) -> Result<DrsObject, IngestError> {
        self.objects
            .lock()
            .unwrap()
            .insert(object.id.clone(), object.clone());
        Ok(object.clone())
    }

    fn verify(&self, _data_type: &str, _id: &str) -> Result<VerifyOutcome, IngestError> {
        Ok(VerifyOutcome {
            result: true,
            message: String::new(),
        })
    }

    fn index(&self, _data_type: &str, _id: &str) -> Result<(), IngestError> {
        Ok(())
    }
}

fn app(clinical: MockClinical) -> App<MockClinical, MockDrs> {
    let config = ConfigLoader::resolve_config(Config {
        clinical_url: "https://candig.example.org/katsu/v3".to_string(),
        genomic_url: "https://candig.example.org/genomics".to_string(),
        drs_host_url: None,
        schema_url: None,
        token: Some("test-token".to_string()),
        batch_size: None,
    });
    App::new(config, clinical, MockDrs::default())
}

fn submission(donors: Vec<Value>) -> ClinicalSubmission {
    ClinicalSubmission {
        openapi_url: None,
        donors,
    }
}

#[test]
fn mixed_submission_fails_per_program() {
    let app = app(MockClinical::default());
    let submission = submission(vec![
        json!({"program_id": "SYNTHETIC-1", "submitter_donor_id": "DONOR_1"}),
        json!({"program_id": "SYNTHETIC-1", "submitter_donor_id": "DONOR_2"}),
        json!({
            "program_id": "SYNTHETIC-2",
            "submitter_donor_id": "DONOR_3",
            "primary_diagnoses": [{
                "submitter_primary_diagnosis_id": "PD_1",
                "specimens": [{"laterality": "left"}]
            }]
        }),
    ]);

    let report = app.ingest_clinical(&submission).unwrap();

    let ok = &report.programs["SYNTHETIC-1"];
    assert!(ok.outcome.is_success());
    assert_eq!(ok.counts["donors"], 2);
    assert_eq!(ok.counts["programs"], 1);

    let bad = &report.programs["SYNTHETIC-2"];
    assert!(matches!(
        bad.outcome,
        IngestOutcome::Validation { ref validation_errors, .. }
            if validation_errors[0].contains("submitter_specimen_id")
    ));
    assert!(bad.counts.is_empty());

    assert_eq!(report.response_code, 422);
}

#[test]
fn single_valid_program_completes() {
    let app = app(MockClinical::default());
    let submission = submission(vec![
        json!({"program_id": "SYNTHETIC-1", "submitter_donor_id": "DONOR_1",
               "primary_diagnoses": [{"submitter_primary_diagnosis_id": "PD_1"}]}),
    ]);

    let report = app.ingest_clinical(&submission).unwrap();
    assert_eq!(report.response_code, 201);
    assert_eq!(report.programs["SYNTHETIC-1"].counts["primary_diagnoses"], 1);
}

#[test]
fn denied_program_reports_permission_without_dispatch() {
    let clinical = MockClinical {
        denied: vec!["SYNTHETIC-2".to_string()],
        ..MockClinical::default()
    };
    let app = app(clinical);
    let submission = submission(vec![
        json!({"program_id": "SYNTHETIC-1", "submitter_donor_id": "DONOR_1"}),
        json!({"program_id": "SYNTHETIC-2", "submitter_donor_id": "DONOR_2"}),
    ]);

    let report = app.ingest_clinical(&submission).unwrap();
    assert!(report.programs["SYNTHETIC-1"].outcome.is_success());
    assert!(matches!(
        report.programs["SYNTHETIC-2"].outcome,
        IngestOutcome::Permission { .. }
    ));
    assert_eq!(report.response_code, 403);
}

#[test]
fn donor_without_program_is_a_user_error() {
    let app = app(MockClinical::default());
    let submission = submission(vec![json!({"submitter_donor_id": "DONOR_1"})]);

    let report = app.ingest_clinical(&submission).unwrap();
    assert!(matches!(
        report.programs["unknown"].outcome,
        IngestOutcome::User { .. }
    ));
}

#[test]
fn genomic_manifest_links_files_and_samples() {
    let app = app(MockClinical::default());
    let manifest = vec![GenomicManifestEntry {
        genomic_file_id: "HG00096".to_string(),
        program_id: "SYNTHETIC-1".to_string(),
        main: FileRef {
            name: "HG00096.vcf.gz".to_string(),
            access_method: "file:///data/HG00096.vcf.gz".to_string(),
        },
        index: Some(FileRef {
            name: "HG00096.vcf.gz.tbi".to_string(),
            access_method: "file:///data/HG00096.vcf.gz.tbi".to_string(),
        }),
        metadata: GenomicMetadata {
            sequence_type: "wgs".to_string(),
            data_type: "variant".to_string(),
            reference: "hg38".to_string(),
        },
        samples: vec![
            SampleLink {
                submitter_sample_id: "SAMPLE_1".to_string(),
                genomic_file_sample_id: "TUMOR_1".to_string(),
            },
            SampleLink {
                submitter_sample_id: "SAMPLE_2".to_string(),
                genomic_file_sample_id: "TUMOR_2".to_string(),
            },
        ],
    }];

    let report = app.ingest_genomic(&manifest);
    assert_eq!(report.summary.status_code, 200);
    assert!(report.summary.errors.is_empty());
    let master = report.summary.results["HG00096"].genomic.as_ref().unwrap();
    assert_eq!(master.contents.len(), 4);
    assert!(master
        .contents
        .iter()
        .any(|entry| entry.drs_uri[0] == "drs://candig.example.org/genomics/HG00096.vcf.gz"));
}

#[test]
fn clean_deletes_each_program() {
    let clinical = MockClinical::default();
    let app = app(clinical);

    let report = app
        .clean(&["SYNTHETIC-1".to_string(), "SYNTHETIC-2".to_string()])
        .unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(report.errors.is_empty());
}
