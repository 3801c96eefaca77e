//! Integration tests for the conversion pipeline.

#![cfg(unix)]

mod helpers;

use helpers::{TRANSLATOR_OK, TestJob, backdate, zip_member_bytes, zip_members};
use pvs_translator::descriptor::MANIFEST_FILE_NAME;
use pvs_translator::{ConversionError, JobOutcome};

#[tokio::test]
async fn test_3d_job_succeeds() {
    let job = TestJob::new("bracket", "par", &[]);
    job.install_working_tools();

    let (outcome, metrics) = job.run().await.expect("run");

    let pvs = job.out("bracket.pvs");
    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            result: pvs.clone(),
            additionals: None,
        }
    );
    assert_eq!(job.status(), format!("0 {}", pvs.display()));
    assert!(job.out("bracket.stp").exists());
    assert!(!job.out("loaderoptions.txt").exists());
    assert_eq!(job.translator_calls(), vec!["stp"]);
    assert_eq!(metrics.tools_invoked, 2);
    assert_eq!(metrics.tools_failed, 0);
}

#[tokio::test]
async fn test_jt_intermediate_uses_jt_converter() {
    let mut job = TestJob::new("housing", "asm", &[]);
    job.install_translator(TRANSLATOR_OK);
    job.install_bundled("JT2PV/jtbatch.bat", helpers::PVS_CONVERTER_OK);
    job.settings.intermediate_format = "jt".to_string();

    let (outcome, _) = job.run().await.expect("run");

    assert!(outcome.is_success());
    assert_eq!(job.translator_calls(), vec!["jt"]);
    assert!(job.out("housing.jt").exists());
    assert_eq!(
        job.status(),
        format!("0 {}", job.out("housing.pvs").display())
    );
}

#[tokio::test]
async fn test_primary_failure_reports_exit_code_stderr_and_log() {
    let job = TestJob::new("bracket", "par", &[]);
    job.install_translator("echo 'line one' >&2\necho 'line two' >&2\nexit 1");
    std::fs::write(job.input_dir.join("bracket.log"), "see log").expect("log");

    let (outcome, metrics) = job.run().await.expect("run");

    assert!(!outcome.is_success());
    let status = job.status();
    assert_eq!(
        status,
        "1 Intermediate file generation failed, failed to generate STEP. \
         Process returned exit code 1: line one<br />line two<br />see log"
    );
    assert!(!status.contains('\n'));
    assert!(!status.contains('\r'));
    assert_eq!(metrics.tools_invoked, 1);
}

#[tokio::test]
async fn test_clean_exit_without_output_fails_job() {
    let job = TestJob::new("bracket", "par", &[]);
    job.install_working_tools();
    job.install_translator("echo 'nothing written' >&2");

    let (outcome, _) = job.run().await.expect("run");

    assert!(!outcome.is_success());
    assert_eq!(
        job.status(),
        "1 Intermediate file generation failed, failed to generate STEP. \
         Process returned exit code 0: nothing written<br />"
    );
}

#[tokio::test]
async fn test_pvs_failure() {
    let job = TestJob::new("bracket", "par", &["STEP"]);
    job.install_translator(TRANSLATOR_OK);
    job.install_bundled("STEP2PV/stepbatch.bat", "echo 'converter crashed'\nexit 3");

    let (outcome, _) = job.run().await.expect("run");

    assert!(!outcome.is_success());
    assert_eq!(
        job.status(),
        "1 PVS file generation failed, failed to generate pvs from STEP. \
         Process returned exit code 3: converter crashed<br />"
    );
    assert!(!job.out("additionals.pvoa").exists());
}

#[tokio::test]
async fn test_translator_timeout_fails_job() {
    let mut job = TestJob::new("bracket", "par", &[]);
    job.install_translator("exec sleep 30");
    job.settings.convert_part_timeout_seconds = 1;

    let started = std::time::Instant::now();
    let (outcome, metrics) = job.run().await.expect("run");

    assert!(started.elapsed() < std::time::Duration::from_secs(15));
    assert!(!outcome.is_success());
    let status = job.status();
    assert!(status.starts_with(
        "1 Intermediate file generation failed, failed to generate STEP. Process returned exit code -999: "
    ));
    assert!(status.contains("Timeout reached, killing process "));
    assert_eq!(metrics.tools_timed_out, 1);
}

#[tokio::test]
async fn test_single_existing_file_is_reused_without_tool() {
    let job = TestJob::new("bracket", "par", &["STEP"]);
    job.install_working_tools();

    let (outcome, metrics) = job.run().await.expect("run");

    let JobOutcome::Succeeded { additionals, .. } = outcome else {
        panic!("expected success, status: {}", job.status());
    };
    let pvoa = additionals.expect("additionals archive");
    assert_eq!(pvoa, job.out("additionals.pvoa"));
    assert_eq!(zip_members(&pvoa), vec!["stp_bracket_par.stp"]);
    // Only the primary translation ran.
    assert_eq!(job.translator_calls(), vec!["stp"]);
    assert!(job.out("bracket.stp").exists());
    assert_eq!(metrics.formats_reused, 1);
    assert_eq!(metrics.formats_generated, 0);
}

#[tokio::test]
async fn test_two_existing_files_are_grouped() {
    let job = TestJob::new("bracket", "par", &["stp"]);
    job.install_working_tools();
    std::fs::create_dir_all(&job.output_dir).expect("mkdir");
    std::fs::write(job.out("older.stp"), "older").expect("write");
    // Creation stamps may share a tick with the translator's output.
    backdate(&job.out("older.stp"), 3600);

    let (outcome, _) = job.run().await.expect("run");

    assert!(outcome.is_success(), "status: {}", job.status());
    let pvoa = job.out("additionals.pvoa");
    assert_eq!(zip_members(&pvoa), vec!["stp_bracket_par.zip"]);

    let files = job.output_files();
    assert!(!files.contains("older.stp"));
    assert!(!files.contains("bracket.stp"));
    assert!(!files.contains("stp_bracket_par.zip"));

    let inner = job.temp.path().join("stp_bracket_par.zip");
    std::fs::write(&inner, zip_member_bytes(&pvoa, "stp_bracket_par.zip")).expect("extract");
    assert_eq!(
        zip_members(&inner),
        vec!["stp_bracket_par_1.stp", "stp_bracket_par_2.stp"]
    );
    // Oldest first.
    assert_eq!(zip_member_bytes(&inner, "stp_bracket_par_1.stp"), b"older");
}

#[tokio::test]
async fn test_missing_formats_are_generated() {
    let job = TestJob::new("bracket", "par", &["iges", "Parasolid"]);
    job.install_working_tools();
    std::fs::create_dir_all(&job.output_dir).expect("mkdir");
    std::fs::write(job.out("stale.log"), "old log").expect("write");

    let (outcome, metrics) = job.run().await.expect("run");

    assert!(outcome.is_success(), "status: {}", job.status());
    assert_eq!(job.translator_calls(), vec!["stp", "igs", "x_t"]);
    assert_eq!(
        zip_members(&job.out("additionals.pvoa")),
        vec!["igs_bracket_par.igs", "x_t_bracket_par.x_t"]
    );
    assert!(!job.out("stale.log").exists());
    assert_eq!(metrics.formats_generated, 2);
}

#[tokio::test]
async fn test_additional_format_failure_fails_job() {
    let job = TestJob::new("bracket", "par", &["iges"]);
    job.install_working_tools();
    job.install_translator(
        r#"
for arg in "$@"; do
  case "$arg" in
    -o=*) out="${arg#-o=}" ;;
    -t=*) ext="${arg#-t=}" ;;
  esac
done
if [ "$ext" = "igs" ]; then
  echo "igs not licensed" >&2
  exit 2
fi
echo "$ext data" > "$out"
"#,
    );

    let (outcome, _) = job.run().await.expect("run");

    assert!(!outcome.is_success());
    assert_eq!(
        job.status(),
        "1 Additional file generation failed, failed to generate igs. \
         Process returned exit code 2: igs not licensed<br />"
    );
    assert!(!job.out("additionals.pvoa").exists());
}

#[tokio::test]
async fn test_unregistered_format_is_skipped() {
    let job = TestJob::new("bracket", "par", &["xyz"]);
    job.install_working_tools();

    let (outcome, metrics) = job.run().await.expect("run");

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            result: job.out("bracket.pvs"),
            additionals: None,
        }
    );
    assert!(!job.out("additionals.pvoa").exists());
    assert_eq!(metrics.formats_skipped, 1);
}

#[tokio::test]
async fn test_drawing_job() {
    let mut job = TestJob::new("sheet", "dft", &["pdf"]);
    job.install_working_tools();
    job.settings.generate_thumbnail = true;

    let (outcome, _) = job.run().await.expect("run");

    let pvs = job.out("sheet.pvs");
    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            result: pvs.clone(),
            additionals: Some(job.out("additionals.pvoa")),
        }
    );
    assert_eq!(job.status(), format!("0 {}", pvs.display()));
    assert_eq!(job.translator_calls(), vec!["pdf"]);
    // The binary PVS still references the drawing's PDF.
    assert!(job.out("sheet.pdf").exists());
    assert!(!job.out("sheet_ascii.pvs").exists());
    assert_eq!(
        zip_members(&job.out("additionals.pvoa")),
        vec!["pdf_sheet_dft.pdf"]
    );
    assert_eq!(
        std::fs::read_to_string(job.out("loaderoptions.txt")).expect("loader options"),
        "thumbnailcreate=true\n"
    );
}

#[tokio::test]
async fn test_drawing_binary_conversion_failure() {
    let job = TestJob::new("sheet", "dft", &[]);
    job.install_working_tools();
    job.install_bundled("PVSCHANGE/pvschangebatch.bat", "echo 'bad ascii' >&2\nexit 7");

    let (outcome, _) = job.run().await.expect("run");

    assert!(!outcome.is_success());
    assert_eq!(
        job.status(),
        "1 PVS file generation failed, failed to convert pvs to binary. \
         Process returned exit code 7: bad ascii<br />"
    );
    assert!(job.out("sheet_ascii.pvs").exists());
}

#[tokio::test]
async fn test_view_refresh_failure_is_not_fatal() {
    let mut job = TestJob::new("sheet", "dft", &[]);
    job.install_working_tools();
    job.install_bundled(
        "SolidEdgeUpdateViews.exe",
        "echo 999999 > \"$(dirname \"$1\")/sedge.pid\"\nexit 5",
    );
    job.settings.refresh_draft_view = true;

    let (outcome, metrics) = job.run().await.expect("run");

    assert!(outcome.is_success(), "status: {}", job.status());
    assert!(!job.input_dir.join("sedge.pid").exists());
    assert_eq!(metrics.tools_invoked, 3);
    assert_eq!(metrics.tools_failed, 1);
}

#[tokio::test]
async fn test_missing_manifest_is_an_error() {
    let job = TestJob::new("bracket", "par", &[]);
    job.install_working_tools();
    std::fs::remove_file(job.input_dir.join(MANIFEST_FILE_NAME)).expect("remove manifest");

    let result = job.run().await;

    assert!(matches!(result, Err(ConversionError::ManifestMissing { .. })));
    assert!(!job.status_file.exists());
}

#[tokio::test]
async fn test_view_refresh_kills_process_named_in_pid_file() {
    use std::os::unix::process::ExitStatusExt;

    let mut job = TestJob::new("sheet", "dft", &[]);
    job.install_working_tools();
    // Outside the refresh helper's process group.
    let mut leftover = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn leftover");
    job.install_bundled(
        "SolidEdgeUpdateViews.exe",
        &format!("echo {} > \"$(dirname \"$1\")/sedge.pid\"", leftover.id()),
    );
    job.settings.refresh_draft_view = true;

    let (outcome, _) = job.run().await.expect("run");

    let mut exited = None;
    for _ in 0..50 {
        exited = leftover.try_wait().expect("try_wait");
        if exited.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    if exited.is_none() {
        let _ = leftover.kill();
        let _ = leftover.wait();
    }

    assert!(outcome.is_success(), "status: {}", job.status());
    assert!(!job.input_dir.join("sedge.pid").exists());
    let status = exited.expect("leftover refresh process still running");
    assert_eq!(status.signal(), Some(9));
}
