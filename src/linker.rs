use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::drs::{access_method_for, DrsClient, DrsContentsEntry, DrsObject};

/// One entry of a genomic-file manifest: a genomic file, its optional index
/// file, and the clinical samples it must be linked to.
#[derive(Debug, Clone, Deserialize)]
pub struct GenomicManifestEntry {
    pub genomic_file_id: String,
    pub program_id: String,
    pub main: FileRef,
    #[serde(default)]
    pub index: Option<FileRef>,
    pub metadata: GenomicMetadata,
    #[serde(default)]
    pub samples: Vec<SampleLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub access_method: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenomicMetadata {
    pub sequence_type: String,
    /// "variant" or "read"; pluralized into htsget endpoint paths.
    pub data_type: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleLink {
    pub submitter_sample_id: String,
    pub genomic_file_sample_id: String,
}

/// Structured partial result of linking one manifest entry. Failures land in
/// `errors`; the link always runs to the end of its state machine.
#[derive(Debug, Default, Serialize)]
pub struct LinkResult {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genomic: Option<DrsObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<DrsObject>,
}

/// Construct or merge the three-tier DRS graph for one manifest entry:
/// file objects, the master genomic object, and one linking object per
/// clinical sample. Every write is a read-merge-write upsert keyed by
/// contents name, so running the same entry twice converges to the same
/// graph.
pub fn link<D: DrsClient>(entry: &GenomicManifestEntry, client: &D, drs_host: &str) -> LinkResult {
    let mut result = LinkResult::default();

    // 1. fetch or initialize the master genomic object
    let mut master = match client.get_object(&entry.genomic_file_id) {
        Ok(Some(existing)) => existing,
        Ok(None) => DrsObject::default(),
        Err(err) => {
            result
                .errors
                .push(format!("error fetching {}: {err}", entry.genomic_file_id));
            DrsObject::default()
        }
    };
    master.id = entry.genomic_file_id.clone();
    master.name = entry.genomic_file_id.clone();
    master.description = entry.metadata.sequence_type.clone();
    master.cohort = entry.program_id.clone();
    master.reference_genome = Some(entry.metadata.reference.clone());
    master.version = "v1".to_string();

    // 2. + 3. attach the main file and, when present, its index
    attach_file(
        &mut master,
        &entry.main,
        &entry.metadata.data_type,
        client,
        drs_host,
        &mut result.errors,
    );
    if let Some(index) = &entry.index {
        attach_file(&mut master, index, "index", client, drs_host, &mut result.errors);
    }

    // 4. cross-link each clinical sample
    for sample in &entry.samples {
        let mut sample_obj = match client.get_object(&sample.submitter_sample_id) {
            Ok(Some(existing)) => existing,
            Ok(None) => DrsObject {
                id: sample.submitter_sample_id.clone(),
                name: sample.submitter_sample_id.clone(),
                description: "sample".to_string(),
                cohort: entry.program_id.clone(),
                version: "v1".to_string(),
                ..DrsObject::default()
            },
            Err(err) => {
                result
                    .errors
                    .push(format!("error fetching {}: {err}", sample.submitter_sample_id));
                continue;
            }
        };
        sample_obj.upsert_contents(DrsContentsEntry {
            name: entry.genomic_file_id.clone(),
            id: entry.genomic_file_id.clone(),
            drs_uri: vec![format!("{drs_host}/{}", entry.genomic_file_id)],
        });
        match client.post_object(&sample_obj) {
            Ok(stored) => result.sample.push(stored),
            Err(err) => result.errors.push(format!(
                "error creating sample drs object {}: {err}",
                sample_obj.id
            )),
        }

        master.upsert_contents(DrsContentsEntry {
            name: sample.submitter_sample_id.clone(),
            id: sample.genomic_file_sample_id.clone(),
            drs_uri: vec![format!("{drs_host}/{}", sample.submitter_sample_id)],
        });
    }

    // 5. write the master object back
    match client.post_object(&master) {
        Ok(stored) => result.genomic = Some(stored),
        Err(err) => result.errors.push(format!(
            "error posting genomic drs object {}: {err}",
            master.id
        )),
    }

    // 6. verify the underlying file, then trigger indexing best-effort
    match client.verify(&entry.metadata.data_type, &entry.genomic_file_id) {
        Ok(outcome) if outcome.result => {
            if let Err(err) = client.index(&entry.metadata.data_type, &entry.genomic_file_id) {
                warn!(id = %entry.genomic_file_id, %err, "index trigger failed");
            }
        }
        Ok(outcome) => result
            .errors
            .push(format!("could not verify sample: {}", outcome.message)),
        Err(err) => result.errors.push(format!("could not verify sample: {err}")),
    }

    result
}

fn attach_file<D: DrsClient>(
    master: &mut DrsObject,
    file: &FileRef,
    content_id: &str,
    client: &D,
    drs_host: &str,
    errors: &mut Vec<String>,
) {
    let access_method = match access_method_for(&file.access_method) {
        Ok(method) => method,
        Err(err) => {
            errors.push(err.to_string());
            return;
        }
    };
    let file_obj = DrsObject {
        id: file.name.clone(),
        name: file.name.clone(),
        description: content_id.to_string(),
        cohort: master.cohort.clone(),
        version: "v1".to_string(),
        access_methods: vec![access_method],
        ..DrsObject::default()
    };
    master.upsert_contents(DrsContentsEntry {
        name: file.name.clone(),
        id: content_id.to_string(),
        drs_uri: vec![format!("{drs_host}/{}", file.name)],
    });
    if let Err(err) = client.post_object(&file_obj) {
        errors.push(format!("error creating file drs object: {err}"));
    }
}

/// Manifest-level aggregation: validate each entry, link it, and collect
/// per-file error lists. Any error mentioning a 403 escalates the overall
/// status to 403 for the caller.
#[derive(Debug, Default, Serialize)]
pub struct GenomicIngestSummary {
    pub errors: BTreeMap<String, Vec<String>>,
    pub results: BTreeMap<String, LinkResult>,
    pub status_code: u16,
}

pub fn ingest_genomic<D: DrsClient>(
    manifest: &[GenomicManifestEntry],
    client: &D,
    drs_host: &str,
) -> GenomicIngestSummary {
    let mut summary = GenomicIngestSummary {
        status_code: 200,
        ..GenomicIngestSummary::default()
    };

    for entry in manifest {
        let mut errors = Vec::new();
        if entry.genomic_file_id == entry.main.name
            || entry
                .index
                .as_ref()
                .is_some_and(|index| entry.genomic_file_id == index.name)
        {
            errors.push(format!(
                "Sample {} cannot have the same name as one of its files.",
                entry.genomic_file_id
            ));
        }
        if entry.samples.is_empty() {
            errors.push("No samples were specified for the genomic file mapping".to_string());
        }
        if !errors.is_empty() {
            summary.errors.insert(entry.genomic_file_id.clone(), errors);
            continue;
        }

        debug!(id = %entry.genomic_file_id, "linking genomic file");
        let result = link(entry, client, drs_host);
        for error in &result.errors {
            if error.contains("403") {
                summary.status_code = 403;
            }
        }
        if !result.errors.is_empty() {
            summary
                .errors
                .insert(entry.genomic_file_id.clone(), result.errors.clone());
        }
        summary.results.insert(entry.genomic_file_id.clone(), result);
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::drs::VerifyOutcome;
    use crate::error::IngestError;

    use super::*;

    /// In-memory DRS store; post is an upsert by id, like the real one.
    #[derive(Default)]
    struct MemoryDrs {
        objects: Mutex<HashMap<String, DrsObject>>,
        fail_posts_for: Option<String>,
        verify_ok: bool,
        indexed: Mutex<Vec<String>>,
    }

    impl MemoryDrs {
        fn verifying() -> Self {
            Self {
                verify_ok: true,
                ..Self::default()
            }
        }

        fn object(&self, id: &str) -> DrsObject {
            self.objects.lock().unwrap().get(id).cloned().unwrap()
        }
    }

    impl DrsClient for MemoryDrs {
        fn get_object(&self, id: &str) -> Result<Option<DrsObject>, IngestError> {
            Ok(self.objects.lock().unwrap().get(id).cloned())
        }

        fn post_object(&self, object: &DrsObject) -> Result<DrsObject, IngestError> {
            if self.fail_posts_for.as_deref() == Some(object.id.as_str()) {
                return Err(IngestError::DrsStatus {
                    status: 403,
                    message: "forbidden".to_string(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .insert(object.id.clone(), object.clone());
            Ok(object.clone())
        }

        fn verify(&self, _data_type: &str, _id: &str) -> Result<VerifyOutcome, IngestError> {
            Ok(VerifyOutcome {
                result: self.verify_ok,
                message: if self.verify_ok {
                    String::new()
                } else {
                    "file unreadable".to_string()
                },
            })
        }

        fn index(&self, _data_type: &str, id: &str) -> Result<(), IngestError> {
            self.indexed.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn entry() -> GenomicManifestEntry {
        GenomicManifestEntry {
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
        }
    }

    #[test]
    fn link_builds_the_three_tier_graph() {
        let client = MemoryDrs::verifying();
        let result = link(&entry(), &client, "drs://host/genomics");

        assert!(result.errors.is_empty());
        let master = result.genomic.unwrap();
        // main + index + two sample links
        assert_eq!(master.contents.len(), 4);
        assert_eq!(master.reference_genome.as_deref(), Some("hg38"));
        assert_eq!(result.sample.len(), 2);
        for sample in &result.sample {
            assert_eq!(sample.contents.len(), 1);
            assert_eq!(sample.contents[0].name, "HG00096");
        }
        assert_eq!(client.indexed.lock().unwrap().as_slice(), ["HG00096"]);
    }

    #[test]
    fn link_twice_is_idempotent() {
        let client = MemoryDrs::verifying();
        let first = link(&entry(), &client, "drs://host/genomics");
        let first_len = first.genomic.unwrap().contents.len();

        let second = link(&entry(), &client, "drs://host/genomics");
        assert_eq!(second.genomic.unwrap().contents.len(), first_len);
        assert_eq!(client.object("SAMPLE_1").contents.len(), 1);
    }

    #[test]
    fn verify_failure_is_an_error_not_a_panic() {
        let client = MemoryDrs::default();
        let result = link(&entry(), &client, "drs://host/genomics");
        assert!(result
            .errors
            .iter()
            .any(|error| error.contains("could not verify")));
        assert!(client.indexed.lock().unwrap().is_empty());
    }

    #[test]
    fn manifest_validation_fails_closed_per_entry() {
        let client = MemoryDrs::verifying();
        let mut bad = entry();
        bad.genomic_file_id = bad.main.name.clone();
        let good = entry();

        let summary = ingest_genomic(&[bad, good], &client, "drs://host/genomics");
        assert_eq!(summary.status_code, 200);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors["HG00096.vcf.gz"][0].contains("same name"));
        assert!(summary.results.contains_key("HG00096"));
    }

    #[test]
    fn forbidden_post_escalates_status() {
        let client = MemoryDrs {
            fail_posts_for: Some("HG00096".to_string()),
            verify_ok: true,
            ..MemoryDrs::default()
        };
        let summary = ingest_genomic(&[entry()], &client, "drs://host/genomics");
        assert_eq!(summary.status_code, 403);
        assert!(summary.errors["HG00096"]
            .iter()
            .any(|error| error.contains("403")));
    }

    #[test]
    fn empty_sample_list_is_rejected() {
        let client = MemoryDrs::verifying();
        let mut no_samples = entry();
        no_samples.samples.clear();

        let summary = ingest_genomic(&[no_samples], &client, "drs://host/genomics");
        assert!(summary.errors["HG00096"][0].contains("No samples"));
        assert!(summary.results.is_empty());
    }
}
