use course_server::{
    artifact::{LocalArtifactStore, NewArtifact},
    course::{self, NewCourse},
    engine::{GatingEngine, Identity, ReviewDecision},
    enrollment,
    progress::ProgressStatus,
    step::{self, MoveDirection, NewStep, StepKind, UpdateStep},
    student,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const ADMIN: Identity = Identity {
    student_id: 0,
    is_admin: true,
};

async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

async fn add_step(
    database: &SqlitePool,
    course_id: i64,
    kind: StepKind,
    needs_text: bool,
    needs_file: bool,
    title: &str,
) -> i64 {
    step::create_step(
        database,
        NewStep {
            course_id,
            kind,
            needs_text,
            needs_file,
            title: title.to_string(),
            body: None,
        },
    )
    .await
    .unwrap()
}

/// The end-to-end scenario: course [info, task(text), task(file),
/// task(text, file)], one learner, submissions reviewed to completion of the
/// third step.
#[tokio::test]
async fn sequential_gating_walkthrough() {
    let database = test_pool().await;
    let artifact_dir = tempfile::tempdir().unwrap();
    let engine = GatingEngine::new(
        database.clone(),
        LocalArtifactStore::new(artifact_dir.path()),
    );

    let student_id = student::create_student(
        &database,
        "Uli".to_string(),
        "uli@example.com".to_string(),
        "hunter2hunter2".to_string(),
        false,
    )
    .await
    .unwrap();
    let learner = Identity::student(student_id);

    let course_id = course::create_course(
        &database,
        NewCourse {
            title: "Safety training".to_string(),
            description: Some("mandatory onboarding".to_string()),
            media_url: None,
        },
    )
    .await
    .unwrap();
    add_step(&database, course_id, StepKind::Info, false, false, "intro").await;
    let essay = add_step(&database, course_id, StepKind::Task, true, false, "essay").await;
    let upload = add_step(&database, course_id, StepKind::Task, false, true, "upload").await;
    let either = add_step(&database, course_id, StepKind::Task, true, true, "either").await;

    engine.enroll(ADMIN, student_id, course_id).await.unwrap();
    assert!(enrollment::exists(&database, student_id, course_id).await.unwrap());

    let state = engine.course_state(learner, course_id).await.unwrap();
    assert_eq!(state[0].status, ProgressStatus::Completed);
    assert_eq!(state[1].status, ProgressStatus::Open);
    assert_eq!(state[2].status, ProgressStatus::Locked);
    assert_eq!(state[3].status, ProgressStatus::Locked);

    // Valid text to step 2, rejected, resubmitted, approved.
    let record = engine
        .submit_answer(learner, essay, Some("first try".to_string()), None)
        .await
        .unwrap();
    assert_eq!(record.status, ProgressStatus::Pending);
    engine
        .review(ADMIN, record.id, ReviewDecision::Reject, Some("more detail".to_string()))
        .await
        .unwrap();
    let state = engine.course_state(learner, course_id).await.unwrap();
    assert_eq!(state[1].status, ProgressStatus::Rejected);
    assert_eq!(state[1].admin_comment.as_deref(), Some("more detail"));

    let record = engine
        .submit_answer(learner, essay, Some("second try, longer".to_string()), None)
        .await
        .unwrap();
    assert_eq!(record.status, ProgressStatus::Pending);
    engine
        .review(ADMIN, record.id, ReviewDecision::Approve, None)
        .await
        .unwrap();
    let state = engine.course_state(learner, course_id).await.unwrap();
    assert_eq!(state[1].status, ProgressStatus::Completed);
    assert_eq!(state[2].status, ProgressStatus::Open);

    // File to step 3, approved; step 4 opens and takes either form.
    let record = engine
        .submit_answer(
            learner,
            upload,
            None,
            Some(NewArtifact {
                bytes: b"certificate scan".to_vec(),
                content_type: Some("image/png".to_string()),
            }),
        )
        .await
        .unwrap();
    engine
        .review(ADMIN, record.id, ReviewDecision::Approve, None)
        .await
        .unwrap();
    let state = engine.course_state(learner, course_id).await.unwrap();
    assert_eq!(state[2].status, ProgressStatus::Completed);
    assert_eq!(state[3].status, ProgressStatus::Open);

    let record = engine
        .submit_answer(learner, either, Some("text suffices here".to_string()), None)
        .await
        .unwrap();
    assert_eq!(record.status, ProgressStatus::Pending);
}

#[tokio::test]
async fn reordering_swaps_adjacent_steps_and_keeps_positions_contiguous() {
    let database = test_pool().await;
    let course_id = course::create_course(
        &database,
        NewCourse {
            title: "c".to_string(),
            description: None,
            media_url: None,
        },
    )
    .await
    .unwrap();
    let a = add_step(&database, course_id, StepKind::Info, false, false, "a").await;
    let b = add_step(&database, course_id, StepKind::Task, true, false, "b").await;
    let c = add_step(&database, course_id, StepKind::Task, true, false, "c").await;

    step::move_step(&database, c, MoveDirection::Up).await.unwrap();
    let steps = step::list_steps(&database, course_id).await.unwrap();
    assert_eq!(
        steps.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![a, c, b]
    );
    assert_eq!(
        steps.iter().map(|s| s.position).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // Edges refuse to move.
    assert!(step::move_step(&database, a, MoveDirection::Up).await.is_err());
    assert!(step::move_step(&database, b, MoveDirection::Down).await.is_err());

    // Deleting the middle step closes the gap.
    step::delete_step(&database, c).await.unwrap();
    let steps = step::list_steps(&database, course_id).await.unwrap();
    assert_eq!(
        steps.iter().map(|s| (s.id, s.position)).collect::<Vec<_>>(),
        vec![(a, 1), (b, 2)]
    );
}

#[tokio::test]
async fn step_kind_and_requirement_combinations_are_checked() {
    let database = test_pool().await;
    let course_id = course::create_course(
        &database,
        NewCourse {
            title: "c".to_string(),
            description: None,
            media_url: None,
        },
    )
    .await
    .unwrap();

    // A task without any requirement and an info step with one are both invalid.
    assert!(
        step::create_step(
            &database,
            NewStep {
                course_id,
                kind: StepKind::Task,
                needs_text: false,
                needs_file: false,
                title: "t".to_string(),
                body: None,
            },
        )
        .await
        .is_err()
    );
    assert!(
        step::create_step(
            &database,
            NewStep {
                course_id,
                kind: StepKind::Info,
                needs_text: true,
                needs_file: false,
                title: "i".to_string(),
                body: None,
            },
        )
        .await
        .is_err()
    );

    let task = add_step(&database, course_id, StepKind::Task, true, false, "t").await;
    assert!(
        step::update_step(
            &database,
            UpdateStep {
                step_id: task,
                needs_text: false,
                needs_file: false,
                title: "t".to_string(),
                body: None,
            },
        )
        .await
        .is_err()
    );
    // Widening the requirement is fine.
    step::update_step(
        &database,
        UpdateStep {
            step_id: task,
            needs_text: true,
            needs_file: true,
            title: "t".to_string(),
            body: None,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn fresh_enrollment_completes_only_the_leading_info_run() {
    let database = test_pool().await;
    let artifact_dir = tempfile::tempdir().unwrap();
    let engine = GatingEngine::new(
        database.clone(),
        LocalArtifactStore::new(artifact_dir.path()),
    );
    let student_id = student::create_student(
        &database,
        "n".to_string(),
        "n@example.com".to_string(),
        "password123".to_string(),
        false,
    )
    .await
    .unwrap();
    let course_id = course::create_course(
        &database,
        NewCourse {
            title: "all info then tasks".to_string(),
            description: None,
            media_url: None,
        },
    )
    .await
    .unwrap();
    add_step(&database, course_id, StepKind::Info, false, false, "i1").await;
    add_step(&database, course_id, StepKind::Info, false, false, "i2").await;
    add_step(&database, course_id, StepKind::Task, true, false, "t1").await;
    add_step(&database, course_id, StepKind::Info, false, false, "i3").await;

    engine.enroll(ADMIN, student_id, course_id).await.unwrap();
    let state = engine
        .course_state(Identity::student(student_id), course_id)
        .await
        .unwrap();
    let statuses: Vec<_> = state.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgressStatus::Completed,
            ProgressStatus::Completed,
            ProgressStatus::Open,
            ProgressStatus::Locked,
        ]
    );
}
