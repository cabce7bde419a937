//! Overlapping distribution and completion runs against one shared ledger.

use futures::future::join_all;
use profit_engine::db::init_db_with_connections;
use profit_engine::distribution::audit_position;
use profit_engine::domain::{Decimal, NewPosition, PeriodUnit, PositionId, TimeMs, UserId};
use profit_engine::{LifecycleManager, ProfitDistributor, Repository};
use std::sync::Arc;
use tempfile::TempDir;

const HOUR: i64 = 3_600_000;

async fn setup_repo(temp_dir: &TempDir) -> Arc<Repository> {
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db_with_connections(&db_path, 8)
        .await
        .expect("init_db failed");
    Arc::new(Repository::new(pool))
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn hourly(user: &str, total_periods: u32) -> NewPosition {
    NewPosition {
        user_id: UserId::new(user),
        plan_id: "standard".to_string(),
        principal: d("1000"),
        period_rate: d("0.001"),
        period_unit: PeriodUnit::Hour,
        total_periods,
        start: TimeMs::new(0),
    }
}

/// Two users, three positions each, all sharing the users' balance rows.
async fn open_positions(repo: &Repository, total_periods: u32) -> Vec<PositionId> {
    let mut ids = Vec::new();
    for user in ["alice", "bob"] {
        repo.provision_account(&UserId::new(user), d("3000"))
            .await
            .unwrap();
        for _ in 0..3 {
            ids.push(repo.open_position(&hourly(user, total_periods)).await.unwrap());
        }
    }
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distribute_never_double_credits() {
    let temp = TempDir::new().unwrap();
    let repo = setup_repo(&temp).await;
    let ids = open_positions(&repo, 24).await;
    let now = TimeMs::new(12 * HOUR);

    let runs = (0..6).map(|_| {
        let distributor = ProfitDistributor::new(repo.clone(), 3);
        tokio::spawn(async move { distributor.distribute(now).await.unwrap() })
    });
    let reports: Vec<_> = join_all(runs)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let total_credited: u64 = reports.iter().map(|r| r.credited).sum();
    assert_eq!(total_credited, 6 * 12);
    for report in &reports {
        assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
        assert_eq!(report.credited + report.skipped, 6 * 12);
    }

    for id in &ids {
        let audit = audit_position(&repo, *id).await.unwrap().unwrap();
        assert_eq!(audit.credited_periods, (1..=12).collect::<Vec<_>>());
        assert_eq!(audit.accumulated_profit, d("12"));
        assert!(audit.consistent);
    }

    // 3000 - 3 × 1000 principal + 3 positions × 12 periods × 1.00
    for user in ["alice", "bob"] {
        assert_eq!(
            repo.get_balance(&UserId::new(user)).await.unwrap(),
            Some(d("36"))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_returns_principal_once() {
    let temp = TempDir::new().unwrap();
    let repo = setup_repo(&temp).await;
    let ids = open_positions(&repo, 4).await;
    let now = TimeMs::new(6 * HOUR);

    let runs = (0..4).map(|_| {
        let distributor = Arc::new(ProfitDistributor::new(repo.clone(), 2));
        let lifecycle = LifecycleManager::new(repo.clone(), distributor, 2);
        tokio::spawn(async move { lifecycle.complete_expired(now).await.unwrap() })
    });
    let reports: Vec<_> = join_all(runs)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let completed: u64 = reports.iter().map(|r| r.completed).sum();
    let credited: u64 = reports.iter().map(|r| r.credited).sum();
    let returned: Decimal = reports.iter().map(|r| r.principal_returned).sum();
    assert_eq!(completed, 6);
    assert_eq!(credited, 6 * 4);
    assert_eq!(returned, d("6000"));

    for id in &ids {
        let audit = audit_position(&repo, *id).await.unwrap().unwrap();
        assert_eq!(audit.principal_returned, d("1000"));
        assert!(audit.consistent);
    }
    for user in ["alice", "bob"] {
        assert_eq!(
            repo.get_balance(&UserId::new(user)).await.unwrap(),
            Some(d("3012"))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distribute_racing_completion() {
    let temp = TempDir::new().unwrap();
    let repo = setup_repo(&temp).await;
    let ids = open_positions(&repo, 8).await;
    let now = TimeMs::new(9 * HOUR);

    let distributor = Arc::new(ProfitDistributor::new(repo.clone(), 4));
    let lifecycle = LifecycleManager::new(repo.clone(), distributor.clone(), 4);

    let (distribution, completion) =
        tokio::join!(distributor.distribute(now), lifecycle.complete_expired(now));
    let distribution = distribution.unwrap();
    let completion = completion.unwrap();

    assert!(distribution.errors.is_empty());
    assert!(completion.errors.is_empty());
    assert_eq!(distribution.credited + completion.credited, 6 * 8);

    // Anything the race left active is finished by a follow-up run.
    let follow_up = lifecycle.complete_expired(now).await.unwrap();
    assert_eq!(completion.completed + follow_up.completed, 6);

    for id in &ids {
        let audit = audit_position(&repo, *id).await.unwrap().unwrap();
        assert_eq!(audit.credited_periods, (1..=8).collect::<Vec<_>>());
        assert_eq!(audit.principal_returned, d("1000"));
        assert!(audit.consistent);
    }
}
