//! CSV export of a finished job.

use crate::error::{JobError, Result};
use crate::types::job::Job;

/// Serialize a terminal job as `url,email` rows.
///
/// Rows follow submission order of URLs, then discovery order of emails
/// within each URL, so repeated exports of the same job are byte-identical.
/// URLs without emails contribute no rows.
pub fn export_csv(job: &Job) -> Result<Vec<u8>> {
    if !job.is_terminal() {
        return Err(JobError::NotReady {
            job_id: job.id,
            status: job.status,
        });
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer
        .write_record(["url", "email"])
        .map_err(|e| JobError::Export(e.to_string()))?;

    for result in &job.results {
        for email in &result.emails {
            writer
                .write_record([result.url.as_str(), email.as_str()])
                .map_err(|e| JobError::Export(e.to_string()))?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| JobError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::job::{JobStatus, OwnerId};
    use crate::types::progress::StageStatus;

    fn finished_job() -> Job {
        let mut job = Job::new(
            OwnerId::new("owner"),
            vec!["https://b.example".into(), "https://a.example".into()],
        );
        for (index, emails) in [vec!["z@b.example", "a@b.example"], vec!["hi@a.example"]]
            .into_iter()
            .enumerate()
        {
            let mut result = job.results[index].clone();
            result.add_emails(emails);
            result
                .progress
                .complete(StageStatus::Completed, "done", 1)
                .unwrap();
            result.refresh_status();
            job.apply_result(index, result);
        }
        job
    }

    #[test]
    fn rows_follow_url_then_discovery_order() {
        let job = finished_job();
        assert_eq!(job.status, JobStatus::Completed);

        let csv = String::from_utf8(export_csv(&job).unwrap()).unwrap();
        assert_eq!(
            csv,
            "url,email\r\n\
             https://b.example,z@b.example\r\n\
             https://b.example,a@b.example\r\n\
             https://a.example,hi@a.example\r\n"
        );
    }

    #[test]
    fn repeated_exports_are_identical() {
        let job = finished_job();
        assert_eq!(export_csv(&job).unwrap(), export_csv(&job).unwrap());
    }

    #[test]
    fn unfinished_job_is_not_ready() {
        let job = Job::new(OwnerId::new("owner"), vec!["https://a.example".into()]);
        let err = export_csv(&job).unwrap_err();
        assert!(matches!(err, JobError::NotReady { status: JobStatus::Queued, .. }));
    }
}
