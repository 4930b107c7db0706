//! Shared solution and vote persistence
//!
//! Votes are upserted one ballot per (solution, voter). The helpful and
//! not-helpful counters are recomputed from the ballots inside the same
//! transaction as the upsert, and `total_votes` only ever grows.

use sahayak_common::models::{trust_score, SharedSolution, SolutionStatus, SolutionVote};
use sahayak_common::{time, Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{json_list, parse_enum, parse_uuid, parse_uuid_opt, to_json};

#[derive(Debug, Clone)]
pub struct NewSolution {
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub school_id: Option<String>,
    pub district: Option<String>,
    pub problem_description: String,
    pub subject: String,
    pub grade: u32,
    pub topic: Option<String>,
    pub solution_title: String,
    pub solution_description: String,
    pub steps: Vec<String>,
    pub materials_needed: Vec<String>,
    pub time_required_minutes: u32,
    pub original_playbook_id: Option<Uuid>,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibrarySort {
    #[default]
    TrustScore,
    UsageCount,
    CreatedAt,
}

impl LibrarySort {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "trust_score" => Some(LibrarySort::TrustScore),
            "usage_count" => Some(LibrarySort::UsageCount),
            "created_at" => Some(LibrarySort::CreatedAt),
            _ => None,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            LibrarySort::TrustScore => "trust_score DESC, created_at DESC",
            LibrarySort::UsageCount => "usage_count DESC, created_at DESC",
            LibrarySort::CreatedAt => "created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LibraryQuery {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub sort: LibrarySort,
    pub skip: i64,
    pub limit: i64,
}

/// Counters after a ballot was recorded, with the ballot as stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteTally {
    pub ballot: SolutionVote,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
    pub total_votes: i64,
    pub trust_score: f64,
}

/// Per-author contribution totals
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorTotals {
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub solutions: i64,
    pub helpful_votes: i64,
}

const SOLUTION_COLUMNS: &str = "id, teacher_id, teacher_name, school_id, district, \
    problem_description, subject, grade, topic, solution_title, solution_description, steps, \
    materials_needed, time_required_minutes, original_playbook_id, is_anonymous, trust_score, \
    usage_count, helpful_count, not_helpful_count, total_votes, status, tags, language, \
    created_at, updated_at";

fn solution_from_row(row: &SqliteRow) -> Result<SharedSolution> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let grade: i64 = row.get("grade");
    let minutes: i64 = row.get("time_required_minutes");

    Ok(SharedSolution {
        id: parse_uuid(row.get("id"))?,
        teacher_id: parse_uuid(row.get("teacher_id"))?,
        teacher_name: row.get("teacher_name"),
        school_id: row.get("school_id"),
        district: row.get("district"),
        problem_description: row.get("problem_description"),
        subject: row.get("subject"),
        grade: u32::try_from(grade).unwrap_or_default(),
        topic: row.get("topic"),
        solution_title: row.get("solution_title"),
        solution_description: row.get("solution_description"),
        steps: json_list(row.get("steps"))?,
        materials_needed: json_list(row.get("materials_needed"))?,
        time_required_minutes: u32::try_from(minutes).unwrap_or_default(),
        original_playbook_id: parse_uuid_opt(row.get("original_playbook_id"))?,
        is_anonymous: row.get("is_anonymous"),
        trust_score: row.get("trust_score"),
        usage_count: row.get("usage_count"),
        helpful_count: row.get("helpful_count"),
        not_helpful_count: row.get("not_helpful_count"),
        total_votes: row.get("total_votes"),
        status: parse_enum(row.get("status"))?,
        tags: json_list(row.get("tags"))?,
        language: row.get("language"),
        created_at: time::from_db(&created_at),
        updated_at: time::from_db(&updated_at),
    })
}

pub async fn insert_solution(pool: &SqlitePool, new: &NewSolution) -> Result<SharedSolution> {
    let id = Uuid::new_v4();
    let now = time::to_db(time::now());

    sqlx::query(
        r#"
        INSERT INTO shared_solutions (
            id, teacher_id, teacher_name, school_id, district, problem_description,
            subject, grade, topic, solution_title, solution_description, steps,
            materials_needed, time_required_minutes, original_playbook_id, is_anonymous,
            status, tags, language, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.teacher_id.to_string())
    .bind(&new.teacher_name)
    .bind(&new.school_id)
    .bind(&new.district)
    .bind(&new.problem_description)
    .bind(&new.subject)
    .bind(i64::from(new.grade))
    .bind(&new.topic)
    .bind(&new.solution_title)
    .bind(&new.solution_description)
    .bind(to_json(&new.steps)?)
    .bind(to_json(&new.materials_needed)?)
    .bind(i64::from(new.time_required_minutes))
    .bind(new.original_playbook_id.map(|p| p.to_string()))
    .bind(new.is_anonymous)
    .bind(to_json(&new.tags)?)
    .bind(&new.language)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_solution(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Solution {} missing after insert", id)))
}

pub async fn get_solution(pool: &SqlitePool, id: Uuid) -> Result<Option<SharedSolution>> {
    let row = sqlx::query(&format!("SELECT {} FROM shared_solutions WHERE id = ?", SOLUTION_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(solution_from_row).transpose()
}

/// Approved and featured solutions
pub async fn list_published(pool: &SqlitePool, query: &LibraryQuery) -> Result<Vec<SharedSolution>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM shared_solutions
        WHERE status IN ('approved', 'featured')
          AND (? IS NULL OR subject = ?)
          AND (? IS NULL OR grade = ?)
        ORDER BY {}
        LIMIT ? OFFSET ?
        "#,
        SOLUTION_COLUMNS,
        query.sort.order_by()
    ))
    .bind(&query.subject)
    .bind(&query.subject)
    .bind(query.grade.map(i64::from))
    .bind(query.grade.map(i64::from))
    .bind(query.limit)
    .bind(query.skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(solution_from_row).collect()
}

/// Published solutions with trust at or above `min_trust`, best first
pub async fn list_trusted(
    pool: &SqlitePool,
    statuses: &[SolutionStatus],
    min_trust: f64,
    grade: Option<u32>,
    limit: i64,
) -> Result<Vec<SharedSolution>> {
    let statuses = to_json(&statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM shared_solutions
        WHERE status IN (SELECT value FROM json_each(?)) AND trust_score >= ?
          AND (? IS NULL OR grade = ?)
        ORDER BY trust_score DESC, usage_count DESC
        LIMIT ?
        "#,
        SOLUTION_COLUMNS
    ))
    .bind(statuses)
    .bind(min_trust)
    .bind(grade.map(i64::from))
    .bind(grade.map(i64::from))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(solution_from_row).collect()
}

/// One author's solutions in any status, newest first
pub async fn list_by_teacher(
    pool: &SqlitePool,
    teacher_id: Uuid,
    skip: i64,
    limit: i64,
) -> Result<Vec<SharedSolution>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM shared_solutions WHERE teacher_id = ? ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        SOLUTION_COLUMNS
    ))
    .bind(teacher_id.to_string())
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(solution_from_row).collect()
}

/// Every solution not archived, for loading the retrieval index
pub async fn list_indexable(pool: &SqlitePool) -> Result<Vec<SharedSolution>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM shared_solutions WHERE status != 'archived' ORDER BY created_at",
        SOLUTION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(solution_from_row).collect()
}

/// Atomic usage counter increment; returns the solution after the increment
pub async fn record_usage(pool: &SqlitePool, id: Uuid) -> Result<Option<SharedSolution>> {
    sqlx::query("UPDATE shared_solutions SET usage_count = usage_count + 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    get_solution(pool, id).await
}

pub async fn set_status(pool: &SqlitePool, id: Uuid, status: SolutionStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE shared_solutions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(time::to_db(time::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

fn row_to_vote(row: &SqliteRow) -> Result<SolutionVote> {
    let voted_at: String = row.get("voted_at");
    Ok(SolutionVote {
        solution_id: parse_uuid(row.get("solution_id"))?,
        teacher_id: parse_uuid(row.get("teacher_id"))?,
        teacher_name: row.get("teacher_name"),
        vote: row.get("vote"),
        comment: row.get("comment"),
        voted_at: time::from_db(&voted_at),
    })
}

/// Record or replace a voter's ballot and refresh the solution's counters
///
/// The ballot upsert is the first statement so the transaction takes the
/// write lock immediately instead of upgrading from a read.
pub async fn cast_vote(
    pool: &SqlitePool,
    solution_id: Uuid,
    voter_id: Uuid,
    voter_name: &str,
    vote: i64,
    comment: Option<&str>,
) -> Result<VoteTally> {
    let mut tx = pool.begin().await?;
    let sid = solution_id.to_string();

    let row = sqlx::query(
        r#"
        INSERT INTO solution_votes (solution_id, teacher_id, teacher_name, vote, comment, voted_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(solution_id, teacher_id) DO UPDATE SET
            vote = excluded.vote,
            comment = excluded.comment,
            voted_at = excluded.voted_at
        RETURNING solution_id, teacher_id, teacher_name, vote, comment, voted_at
        "#,
    )
    .bind(&sid)
    .bind(voter_id.to_string())
    .bind(voter_name)
    .bind(vote)
    .bind(comment)
    .bind(time::to_db(time::now()))
    .fetch_one(&mut *tx)
    .await?;
    let ballot = row_to_vote(&row)?;

    let ballots = sqlx::query(
        r#"
        SELECT COUNT(*) AS voters,
               COALESCE(SUM(vote = 1), 0) AS helpful,
               COALESCE(SUM(vote = -1), 0) AS not_helpful
        FROM solution_votes WHERE solution_id = ?
        "#,
    )
    .bind(&sid)
    .fetch_one(&mut *tx)
    .await?;
    let voters: i64 = ballots.get("voters");
    let helpful: i64 = ballots.get("helpful");
    let not_helpful: i64 = ballots.get("not_helpful");

    let current = sqlx::query("SELECT usage_count, trust_score, total_votes FROM shared_solutions WHERE id = ?")
        .bind(&sid)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Solution {} not found", solution_id)))?;
    let usage: i64 = current.get("usage_count");
    let previous_trust: f64 = current.get("trust_score");
    let previous_total: i64 = current.get("total_votes");

    let trust = trust_score(helpful, not_helpful, usage).unwrap_or(previous_trust);
    let total_votes = voters.max(previous_total);

    sqlx::query(
        r#"
        UPDATE shared_solutions
        SET helpful_count = ?, not_helpful_count = ?, total_votes = ?, trust_score = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(helpful)
    .bind(not_helpful)
    .bind(total_votes)
    .bind(trust)
    .bind(time::to_db(time::now()))
    .bind(&sid)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(VoteTally {
        ballot,
        helpful_count: helpful,
        not_helpful_count: not_helpful,
        total_votes,
        trust_score: trust,
    })
}

/// Solutions shared and helpful votes received, per author
///
/// `teacher_ids` of `None` covers every author.
pub async fn contributor_totals(pool: &SqlitePool, teacher_ids: Option<&[Uuid]>) -> Result<Vec<ContributorTotals>> {
    let ids = teacher_ids
        .map(|ids| to_json(&ids.iter().map(Uuid::to_string).collect::<Vec<_>>()))
        .transpose()?;

    let rows = sqlx::query(
        r#"
        SELECT s.teacher_id AS teacher_id,
               COALESCE(u.name, MAX(s.teacher_name)) AS teacher_name,
               COUNT(*) AS solutions,
               COALESCE(SUM(s.helpful_count), 0) AS helpful_votes
        FROM shared_solutions s
        LEFT JOIN users u ON u.id = s.teacher_id
        WHERE ? IS NULL OR s.teacher_id IN (SELECT value FROM json_each(?))
        GROUP BY s.teacher_id
        "#,
    )
    .bind(&ids)
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ContributorTotals {
                teacher_id: parse_uuid(row.get("teacher_id"))?,
                teacher_name: row.get("teacher_name"),
                solutions: row.get("solutions"),
                helpful_votes: row.get("helpful_votes"),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn new_solution(teacher_id: Uuid, subject: &str, grade: u32) -> NewSolution {
        NewSolution {
            teacher_id,
            teacher_name: "Asha".to_string(),
            school_id: Some("SCH-1".to_string()),
            district: Some("Mysuru".to_string()),
            problem_description: "Students mix up numerator and denominator".to_string(),
            subject: subject.to_string(),
            grade,
            topic: Some("Fractions".to_string()),
            solution_title: "Roti fractions".to_string(),
            solution_description: "Tear a roti into equal parts and name each part".to_string(),
            steps: vec!["Show a whole roti".to_string(), "Tear into halves".to_string()],
            materials_needed: vec!["Roti or paper circle".to_string()],
            time_required_minutes: 10,
            original_playbook_id: None,
            is_anonymous: false,
            tags: vec!["fractions".to_string()],
            language: "en".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::new_solution;
    use super::*;
    use crate::db::test_pool;
    use crate::db::users::{create_user, test_support::new_user};
    use sahayak_common::models::Role;
    use sahayak_common::models::User;

    async fn teachers(pool: &SqlitePool, n: usize) -> Vec<User> {
        let mut out = Vec::new();
        for i in 0..n {
            out.push(
                create_user(pool, &new_user(&format!("t{}@x.in", i), Role::Teacher, Some("Mysuru"), None))
                    .await
                    .unwrap(),
            );
        }
        out
    }

    #[tokio::test]
    async fn test_new_solution_is_pending_and_hidden() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 1).await;
        let s = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 5)).await.unwrap();
        assert_eq!(s.status, SolutionStatus::Pending);
        assert_eq!(s.steps.len(), 2);

        let query = LibraryQuery {
            limit: 20,
            ..Default::default()
        };
        assert!(list_published(&pool, &query).await.unwrap().is_empty());

        assert!(set_status(&pool, s.id, SolutionStatus::Approved).await.unwrap());
        assert_eq!(list_published(&pool, &query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_library_filters_and_sort() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 1).await;
        let a = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 5)).await.unwrap();
        let b = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 6)).await.unwrap();
        let c = insert_solution(&pool, &new_solution(t[0].id, "Science", 6)).await.unwrap();
        for s in [&a, &b, &c] {
            set_status(&pool, s.id, SolutionStatus::Featured).await.unwrap();
        }
        record_usage(&pool, b.id).await.unwrap();
        record_usage(&pool, b.id).await.unwrap();

        let maths = list_published(
            &pool,
            &LibraryQuery {
                subject: Some("Mathematics".to_string()),
                sort: LibrarySort::UsageCount,
                limit: 20,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(maths.len(), 2);
        assert_eq!(maths[0].id, b.id);
        assert_eq!(maths[0].usage_count, 2);

        let grade6 = list_published(
            &pool,
            &LibraryQuery {
                grade: Some(6),
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(grade6.len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_teacher_pages_own_solutions() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 2).await;
        for grade in 1..=3 {
            insert_solution(&pool, &new_solution(t[0].id, "Mathematics", grade)).await.unwrap();
        }
        insert_solution(&pool, &new_solution(t[1].id, "Science", 4)).await.unwrap();

        let all = list_by_teacher(&pool, t[0].id, 0, 50).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|s| s.teacher_id == t[0].id));

        let first = list_by_teacher(&pool, t[0].id, 0, 2).await.unwrap();
        let rest = list_by_teacher(&pool, t[0].id, 2, 2).await.unwrap();
        assert_eq!((first.len(), rest.len()), (2, 1));
        assert_eq!(rest[0].id, all[2].id);
    }

    #[tokio::test]
    async fn test_revote_replaces_ballot() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 2).await;
        let s = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 5)).await.unwrap();

        let tally = cast_vote(&pool, s.id, t[1].id, "Ravi", 1, Some("worked")).await.unwrap();
        assert_eq!(tally.ballot.solution_id, s.id);
        assert_eq!(tally.ballot.teacher_id, t[1].id);
        assert_eq!(tally.ballot.comment.as_deref(), Some("worked"));
        assert_eq!(tally.helpful_count, 1);
        assert_eq!(tally.total_votes, 1);
        assert_eq!(tally.trust_score, 4.0);

        let tally = cast_vote(&pool, s.id, t[1].id, "Ravi", -1, None).await.unwrap();
        assert_eq!(tally.ballot.vote, -1);
        assert_eq!(tally.ballot.comment, None);
        assert_eq!(tally.helpful_count, 0);
        assert_eq!(tally.not_helpful_count, 1);
        assert_eq!(tally.total_votes, 1);
        assert_eq!(tally.trust_score, 0.0);

        // A neutral ballot keeps the last trust score
        let tally = cast_vote(&pool, s.id, t[1].id, "Ravi", 0, None).await.unwrap();
        assert_eq!(tally.not_helpful_count, 0);
        assert_eq!(tally.trust_score, 0.0);
    }

    #[tokio::test]
    async fn test_vote_on_missing_solution() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 1).await;
        let result = cast_vote(&pool, Uuid::new_v4(), t[0].id, "x", 1, None).await;
        // Foreign key rejects the ballot before the lookup runs
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_votes_keep_total_monotonic() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 9).await;
        let s = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 5)).await.unwrap();

        let mut handles = Vec::new();
        for voter in t.iter().skip(1) {
            let pool = pool.clone();
            let voter_id = voter.id;
            let sid = s.id;
            handles.push(tokio::spawn(async move {
                cast_vote(&pool, sid, voter_id, "v", 1, None).await.unwrap().total_votes
            }));
        }
        for h in handles {
            let total = h.await.unwrap();
            assert!((1..=8).contains(&total));
        }

        let s = get_solution(&pool, s.id).await.unwrap().unwrap();
        assert_eq!(s.total_votes, 8);
        assert_eq!(s.helpful_count, 8);
    }

    #[tokio::test]
    async fn test_trusted_and_contributors() {
        let (_dir, pool) = test_pool().await;
        let t = teachers(&pool, 3).await;
        let good = insert_solution(&pool, &new_solution(t[0].id, "Mathematics", 5)).await.unwrap();
        let other = insert_solution(&pool, &new_solution(t[0].id, "Science", 7)).await.unwrap();
        insert_solution(&pool, &new_solution(t[1].id, "English", 3)).await.unwrap();
        set_status(&pool, good.id, SolutionStatus::Approved).await.unwrap();
        set_status(&pool, other.id, SolutionStatus::Approved).await.unwrap();
        cast_vote(&pool, good.id, t[1].id, "b", 1, None).await.unwrap();
        cast_vote(&pool, good.id, t[2].id, "c", 1, None).await.unwrap();

        let trusted = list_trusted(&pool, &[SolutionStatus::Approved], 3.0, None, 50).await.unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].id, good.id);

        let mut totals = contributor_totals(&pool, None).await.unwrap();
        totals.sort_by_key(|c| -c.solutions);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].teacher_id, t[0].id);
        assert_eq!(totals[0].solutions, 2);
        assert_eq!(totals[0].helpful_votes, 2);

        let scoped = contributor_totals(&pool, Some(&[t[1].id])).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].solutions, 1);
    }
}
