//! Splitting matched rows into per-worker jobs.

use smallvec::SmallVec;
use tessera_ecs::ArchetypeId;

/// A contiguous range of rows in one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    pub table: ArchetypeId,
    pub start: usize,
    pub count: usize,
}

/// Jobs assigned to each worker, plus those left for the dispatcher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobPlan {
    pub per_worker: Vec<SmallVec<[Job; 16]>>,
    pub overflow: Vec<Job>,
}

impl JobPlan {
    /// Total jobs in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.per_worker.iter().map(SmallVec::len).sum::<usize>() + self.overflow.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `tables` (id and row count, in iteration order) across
/// `workers`.
///
/// Each worker gets at most `ceil(total / workers)` rows, so a table may be
/// split across consecutive workers. A worker holding `max_jobs` jobs
/// passes the rest of its share to [`JobPlan::overflow`].
#[must_use]
pub fn plan(tables: &[(ArchetypeId, usize)], workers: usize, max_jobs: usize) -> JobPlan {
    let mut plan = JobPlan {
        per_worker: vec![SmallVec::new(); workers],
        overflow: Vec::new(),
    };

    let total: usize = tables.iter().map(|&(_, rows)| rows).sum();
    if total == 0 {
        return plan;
    }
    if workers == 0 {
        plan.overflow.extend(
            tables
                .iter()
                .filter(|&&(_, rows)| rows > 0)
                .map(|&(table, rows)| Job {
                    table,
                    start: 0,
                    count: rows,
                }),
        );
        return plan;
    }

    let share = total.div_ceil(workers);
    let mut worker = 0;
    let mut room = share;

    for &(table, rows) in tables {
        let mut start = 0;
        while start < rows {
            let count = (rows - start).min(room);
            let job = Job {
                table,
                start,
                count,
            };
            match plan.per_worker.get_mut(worker) {
                Some(jobs) if jobs.len() < max_jobs => jobs.push(job),
                _ => plan.overflow.push(job),
            }
            start += count;
            room -= count;
            if room == 0 {
                worker += 1;
                room = share;
            }
        }
    }

    plan
}
