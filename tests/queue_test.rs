mod common;

use common::*;
use factorq::evaluate::EvaluationMetrics;
use factorq::storage::repository::{JobRequest, JobStatus};
use factorq::PlatformError;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn metrics(ic: f64, icir: f64) -> EvaluationMetrics {
    EvaluationMetrics {
        ic,
        icir,
        ..Default::default()
    }
}

mod submit_job {
    use super::*;

    #[tokio::test]
    async fn snapshots_expression_and_defaults() {
        let (platform, _dir) = temp_platform().await;
        let mut def = factorq::storage::repository::FactorDefinition::new("f1", "$close");
        def.name = Some("Close".to_string());
        def.owner = Some("desk-a".to_string());
        def.tags = Some(vec!["price".to_string()]);
        platform.register_factor(def).await.unwrap();

        let submitted = platform
            .submit_job(JobRequest::new("f1", "2024-01-01", "2024-02-01"))
            .await
            .unwrap();
        assert_eq!(submitted.factor_version, 1);
        assert_eq!(submitted.freq, "day");

        register(&platform, "f1", "$open").await;
        let job = platform.get_job(submitted.job_id).await.unwrap();
        assert_eq!(job.expression, "$close");
        assert_eq!(job.summary.status, JobStatus::Pending);
        assert_eq!(job.summary.priority, 5);
        assert_eq!(job.summary.owner.as_deref(), Some("desk-a"));
        assert_eq!(job.tags, vec!["price"]);
        assert_eq!(job.context.get("factor_name"), Some(&json!("Close")));
    }

    #[tokio::test]
    async fn pinned_version_and_caller_context_win() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        register(&platform, "f1", "$open").await;

        let mut context = Map::new();
        context.insert("factor_name".into(), json!("custom"));
        context.insert("batch".into(), json!(7));
        let req = JobRequest {
            version: Some(1),
            context: Some(context),
            priority: 42,
            ..JobRequest::new("f1", "2024-01-01", "2024-01-31")
        };
        let id = platform.submit_job(req).await.unwrap().job_id;
        let job = platform.get_job(id).await.unwrap();
        assert_eq!(job.expression, "$close");
        assert_eq!(job.summary.factor_version, 1);
        assert_eq!(job.summary.priority, 10);
        assert_eq!(job.context.get("factor_name"), Some(&json!("custom")));
        assert_eq!(job.context.get("batch"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;

        let bad = [
            JobRequest::new("", "2024-01-01", "2024-01-31"),
            JobRequest::new("f1", "2024/01/01", "2024-01-31"),
            JobRequest::new("f1", "2024-02-01", "2024-01-31"),
        ];
        for req in bad {
            let err = platform.submit_job(req).await.unwrap_err();
            assert!(matches!(err, PlatformError::InvalidInput(_)), "{:?}", err);
        }
        let err = platform
            .submit_job(JobRequest::new("ghost", "2024-01-01", "2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
        assert_eq!(platform.job_stats().await.unwrap().total, 0);
    }
}

mod dequeue {
    use super::*;

    #[tokio::test]
    async fn claims_by_priority_then_age() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let mut ids = Vec::new();
        for p in [5, 1, 5, 3] {
            ids.push(submit(&platform, "f1", p).await);
        }

        let claimed = platform.dequeue_jobs("w1", 4).await.unwrap();
        let order: Vec<i32> = claimed.iter().map(|j| j.job_id).collect();
        assert_eq!(order, vec![ids[1], ids[3], ids[0], ids[2]]);
        assert!(claimed.iter().all(|j| j.name == "f1"));

        for id in ids {
            assert_eq!(platform.get_job(id).await.unwrap().summary.status, JobStatus::Running);
        }
        assert!(platform.dequeue_jobs("w1", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn respects_limit_and_records_claimer() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        for _ in 0..3 {
            submit(&platform, "f1", 5).await;
        }
        let first = platform.dequeue_jobs("w1", 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let job = platform.get_job(first[0].job_id).await.unwrap();
        assert_eq!(job.claimed_by.as_deref(), Some("w1"));
        assert!(job.claimed_at.is_some());

        // zero is treated as one
        assert_eq!(platform.dequeue_jobs("w2", 0).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claimers_never_share_a_job() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let mut submitted = HashSet::new();
        for i in 0..40 {
            submitted.insert(submit(&platform, "f1", (i % 10) + 1).await);
        }

        let mut handles = Vec::new();
        for w in 0..6 {
            let platform = platform.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = platform.dequeue_jobs(&format!("w{}", w), 3).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|j| j.job_id));
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "job {} claimed twice", id);
            }
        }
        assert_eq!(seen, submitted);
    }
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn success_is_idempotent() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let id = submit(&platform, "f1", 5).await;
        platform.dequeue_jobs("w1", 1).await.unwrap();

        platform
            .mark_job_succeeded(id, metrics(0.05, 0.8), Some("/out/a.csv".into()))
            .await
            .unwrap();
        let status = platform
            .mark_job_succeeded(id, metrics(0.9, 9.0), None)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Success);

        let job = platform.get_job(id).await.unwrap();
        let stored = job.summary.metrics.unwrap();
        assert_eq!(stored.ic, 0.05);
        assert_eq!(stored.icir, 0.8);
        assert_eq!(job.summary.result_path.as_deref(), Some("/out/a.csv"));

        let listed = platform
            .list_jobs(Some(JobStatus::Success), 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, id);
        assert_eq!(listed[0].metrics, Some(metrics(0.05, 0.8)));
    }

    #[tokio::test]
    async fn failed_job_cannot_succeed() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let id = submit(&platform, "f1", 5).await;
        platform.mark_job_failed(id, "provider down").await.unwrap();

        let err = platform
            .mark_job_succeeded(id, metrics(0.1, 1.0), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlatformError::InvalidTransition {
                from: JobStatus::Failed,
                to: JobStatus::Success,
                ..
            }
        ));
        let job = platform.get_job(id).await.unwrap();
        assert_eq!(job.summary.status, JobStatus::Failed);
        assert_eq!(job.summary.error_message.as_deref(), Some("provider down"));
        assert!(job.summary.metrics.is_none());
    }

    #[tokio::test]
    async fn succeeded_job_cannot_fail() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let id = submit(&platform, "f1", 5).await;
        platform
            .mark_job_succeeded(id, metrics(0.1, 1.0), None)
            .await
            .unwrap();
        assert!(matches!(
            platform.mark_job_failed(id, "late failure").await.unwrap_err(),
            PlatformError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn error_message_is_truncated() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let id = submit(&platform, "f1", 5).await;
        platform.mark_job_failed(id, &"é".repeat(1500)).await.unwrap();
        let job = platform.get_job(id).await.unwrap();
        assert_eq!(job.summary.error_message.unwrap().chars().count(), 1000);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (platform, _dir) = temp_platform().await;
        assert!(matches!(
            platform
                .mark_job_succeeded(999, metrics(0.0, 0.0), None)
                .await
                .unwrap_err(),
            PlatformError::NotFound(_)
        ));
        assert!(matches!(
            platform.get_job(999).await.unwrap_err(),
            PlatformError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn attach_result_path_touches_only_the_path() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let done = submit(&platform, "f1", 5).await;
        let pending = submit(&platform, "f1", 5).await;
        platform
            .mark_job_succeeded(done, metrics(0.02, 0.3), None)
            .await
            .unwrap();

        let before = platform.get_job(done).await.unwrap();
        let updated = platform
            .attach_result_path(&[done, pending, 12345], "/reports/run1.parquet")
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let after = platform.get_job(done).await.unwrap();
        assert_eq!(after.summary.status, before.summary.status);
        assert_eq!(after.summary.metrics, before.summary.metrics);
        assert_eq!(after.summary.result_path.as_deref(), Some("/reports/run1.parquet"));
        let still_pending = platform.get_job(pending).await.unwrap();
        assert_eq!(still_pending.summary.status, JobStatus::Pending);
        assert_eq!(
            still_pending.summary.result_path.as_deref(),
            Some("/reports/run1.parquet")
        );
    }
}

mod reporting {
    use super::*;

    #[tokio::test]
    async fn stats_count_each_status() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(submit(&platform, "f1", 5).await);
        }
        assert_eq!(platform.dequeue_jobs("w1", 1).await.unwrap()[0].job_id, ids[0]);
        platform.mark_job_succeeded(ids[1], metrics(0.1, 1.0), None).await.unwrap();
        platform.mark_job_failed(ids[2], "boom").await.unwrap();

        let stats = platform.job_stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 2);

        let failed = platform.list_jobs(Some(JobStatus::Failed), 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job_id, ids[2]);
        assert_eq!(platform.list_jobs(None, 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn list_jobs_is_newest_first() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let mut ids = Vec::new();
        for p in [3, 1, 7, 5] {
            ids.push(submit(&platform, "f1", p).await);
        }

        let listed: Vec<i32> = platform
            .list_jobs(None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        let mut newest_first = ids.clone();
        newest_first.reverse();
        assert_eq!(listed, newest_first);

        let all = platform.list_jobs(None, 10).await.unwrap();
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        let top2: Vec<i32> = platform
            .list_jobs(None, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(top2, newest_first[..2].to_vec());
    }

    #[tokio::test]
    async fn summary_ranks_by_icir_then_ic() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let a = submit(&platform, "f1", 5).await;
        let b = submit(&platform, "f1", 5).await;
        let c = submit(&platform, "f1", 5).await;
        let d = submit(&platform, "f1", 5).await;
        platform.mark_job_succeeded(a, metrics(0.01, 0.5), None).await.unwrap();
        platform.mark_job_succeeded(b, metrics(0.03, 1.2), None).await.unwrap();
        platform.mark_job_succeeded(c, metrics(0.04, 0.5), None).await.unwrap();
        platform.mark_job_failed(d, "x").await.unwrap();

        let top: Vec<i32> = platform
            .summarize_results(10)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(top, vec![b, c, a]);
        assert_eq!(platform.summarize_results(1).await.unwrap().len(), 1);
    }
}

mod callbacks {
    use super::*;

    async fn capture_one_request(listener: TcpListener) -> String {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let len = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + len {
                    break;
                }
            }
        }
        sock.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&buf).to_string();
        text.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_default()
    }

    #[tokio::test]
    async fn success_posts_callback_once() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(capture_one_request(listener));

        let req = JobRequest {
            callback_url: Some(format!("http://{}/done", addr)),
            ..JobRequest::new("f1", "2024-01-01", "2024-01-31")
        };
        let id = platform.submit_job(req).await.unwrap().job_id;
        platform
            .mark_job_succeeded(id, metrics(0.05, 0.8), Some("/out/x.csv".into()))
            .await
            .unwrap();

        let body = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["job_id"], id);
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["metrics"]["IC"], 0.05);
        assert_eq!(v["result_path"], "/out/x.csv");
    }

    #[tokio::test]
    async fn unreachable_callback_does_not_fail_the_job() {
        let (platform, _dir) = temp_platform().await;
        register(&platform, "f1", "$close").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let req = JobRequest {
            callback_url: Some(format!("http://{}/done", addr)),
            ..JobRequest::new("f1", "2024-01-01", "2024-01-31")
        };
        let id = platform.submit_job(req).await.unwrap().job_id;
        let status = platform
            .mark_job_succeeded(id, metrics(0.05, 0.8), None)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Success);
        assert_eq!(platform.get_job(id).await.unwrap().summary.status, JobStatus::Success);
    }

    /// Reads one HTTP request off a blocking socket and returns its body.
    fn read_request_body(sock: &mut std::net::TcpStream) -> String {
        use std::io::Read;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let len = head
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if body.len() >= len {
                    return body.to_string();
                }
            }
        }
        String::new()
    }

    #[test]
    fn complete_job_command_delivers_callback_before_runtime_shutdown() {
        use factorq::commands::{self, AppCommand};
        use factorq::Config;
        use std::io::Write;
        use std::time::Duration;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let body = read_request_body(&mut sock);
            let _ = sock.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = tx.send(body);
        });

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let (dir, job_id) = rt.block_on(async {
            let (platform, dir) = temp_platform().await;
            register(&platform, "f1", "$close").await;
            let req = JobRequest {
                callback_url: Some(format!("http://{}/done", addr)),
                ..JobRequest::new("f1", "2024-01-01", "2024-01-31")
            };
            let job_id = platform.submit_job(req).await.unwrap().job_id;

            let config = Config {
                database_url: db_url(&dir),
                ..Config::default()
            };
            commands::run(
                AppCommand::CompleteJob {
                    job_id,
                    metrics: r#"{"IC": 0.05, "ICIR": 0.8}"#.to_string(),
                    result_path: None,
                },
                config,
            )
            .await
            .unwrap();
            (dir, job_id)
        });
        // what `main` does once the command returns
        drop(rt);

        let body = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("callback never reached the endpoint");
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["job_id"], job_id);
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["metrics"]["ICIR"], 0.8);
        drop(dir);
    }
}
