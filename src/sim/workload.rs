use std::{fmt, fs, io, path::Path, str::FromStr};

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    core::{Compat, Priority, TaskEvent, Ticks},
    scheduler::{PolicyKind, SchedError, SchedulerConfig},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(default)]
    pub color: String,
    pub arrival: Ticks,
    pub duration: Ticks,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub events: Vec<TaskEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub config: SchedulerConfig,
    #[serde(default)]
    pub compat: Compat,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug)]
pub enum WorkloadError {
    Empty,
    Parse { line: usize, msg: String },
    Policy { line: usize, source: SchedError },
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "workload has no header record"),
            Self::Parse { line, msg } => write!(f, "line {line}: {msg}"),
            Self::Policy { line, source } => write!(f, "line {line}: {source}"),
            Self::Io(e) => write!(f, "failed to read workload: {e}"),
            Self::Json(e) => write!(f, "invalid JSON workload: {e}"),
        }
    }
}

impl std::error::Error for WorkloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Policy { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkloadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for WorkloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

fn parse_err(line: usize, msg: impl Into<String>) -> WorkloadError {
    WorkloadError::Parse {
        line,
        msg: msg.into(),
    }
}

fn number<T: FromStr>(line: usize, what: &str, field: &str) -> Result<T, WorkloadError> {
    field
        .trim()
        .parse()
        .map_err(|_| parse_err(line, format!("invalid {what} {field:?}")))
}

impl Workload {
    /// Load a workload, as JSON when the file ends in `.json` and in the
    /// line format otherwise.
    pub fn load(path: &Path) -> Result<Self, WorkloadError> {
        let text = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&text)
        } else {
            Self::parse(&text)
        }
    }

    pub fn from_json(text: &str) -> Result<Self, WorkloadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Line format: a header `ALG;quantum[;aging]` followed by one
    /// `id;color;arrival;duration;priority[;event...]` line per task.
    /// Events are `IO:start-duration`, `ML:t` and `MU:t`. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn parse(text: &str) -> Result<Self, WorkloadError> {
        let mut records = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (line, header) = records.next().ok_or(WorkloadError::Empty)?;
        let config = parse_header(line, header)?;
        let tasks = records
            .map(|(line, record)| parse_task(line, record))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            config,
            compat: Compat::default(),
            tasks,
        })
    }
}

// Empty fields are kept so columns never shift
fn fields(record: &str) -> Vec<&str> {
    record.split(';').map(str::trim).collect()
}

fn required<'a>(line: usize, what: &str, field: &'a str) -> Result<&'a str, WorkloadError> {
    if field.is_empty() {
        return Err(parse_err(line, format!("empty {what}")));
    }
    Ok(field)
}

fn parse_header(line: usize, header: &str) -> Result<SchedulerConfig, WorkloadError> {
    let fields = fields(header);
    let (name, quantum) = match fields.as_slice() {
        [name, quantum, ..] => (*name, *quantum),
        _ => return Err(parse_err(line, "header needs an algorithm and a quantum")),
    };

    let policy: PolicyKind = name
        .parse()
        .map_err(|source| WorkloadError::Policy { line, source })?;
    let quantum = number(line, "quantum", required(line, "quantum", quantum)?)?;
    let aging = match (policy, fields.get(2).filter(|aging| !aging.is_empty())) {
        (_, Some(aging)) => number(line, "aging increment", aging)?,
        (PolicyKind::PriorityPreemptiveAging, None) => {
            return Err(parse_err(line, "PRIOPEnv needs an aging increment"));
        }
        (_, None) => 0,
    };

    Ok(SchedulerConfig {
        policy,
        quantum,
        aging,
    })
}

fn parse_task(line: usize, record: &str) -> Result<TaskSpec, WorkloadError> {
    let fields = fields(record);
    let [id, color, arrival, duration, priority, events @ ..] = fields.as_slice() else {
        return Err(parse_err(
            line,
            "task needs id, color, arrival, duration and priority",
        ));
    };

    Ok(TaskSpec {
        id: required(line, "id", id)?.to_string(),
        color: required(line, "color", color)?.to_string(),
        arrival: number(line, "arrival", required(line, "arrival", arrival)?)?,
        duration: number(line, "duration", required(line, "duration", duration)?)?,
        priority: number(line, "priority", required(line, "priority", priority)?)?,
        events: events
            .iter()
            .filter(|token| !token.is_empty())
            .map(|token| parse_event(line, token))
            .collect::<Result<_, _>>()?,
    })
}

fn parse_event(line: usize, token: &str) -> Result<TaskEvent, WorkloadError> {
    let Some((kind, params)) = token.split_once(':') else {
        return Err(parse_err(line, format!("malformed event {token:?}")));
    };

    match kind.trim().to_ascii_uppercase().as_str() {
        "IO" => {
            let (start, duration) = params
                .split_once('-')
                .ok_or_else(|| parse_err(line, format!("IO event {token:?} needs start-duration")))?;
            Ok(TaskEvent::io(
                number(line, "IO start", start)?,
                number(line, "IO duration", duration)?,
            ))
        }
        "ML" => Ok(TaskEvent::lock(number(line, "lock tick", params)?)),
        "MU" => Ok(TaskEvent::unlock(number(line, "unlock tick", params)?)),
        other => Err(parse_err(line, format!("unknown event type {other:?}"))),
    }
}

const PALETTE: [&str; 6] = ["red", "green", "blue", "yellow", "magenta", "cyan"];

/// Knobs for [`bernoulli_tasks`]. Each tick in `0..ticks` spawns a task
/// with probability `p_arrival`.
#[derive(Debug, Clone)]
pub struct Synthetic {
    pub ticks: Ticks,
    pub p_arrival: f64,
    pub p_short: f64,
    pub short_ticks: Ticks,
    pub long_ticks: Ticks,
    pub max_priority: Priority,
    pub p_io: f64,
    pub max_io_ticks: Ticks,
    pub p_critical: f64,
}

impl Default for Synthetic {
    fn default() -> Self {
        Self {
            ticks: 20,
            p_arrival: 0.3,
            p_short: 0.3,
            short_ticks: 2,
            long_ticks: 6,
            max_priority: 5,
            p_io: 0.2,
            max_io_ticks: 3,
            p_critical: 0.2,
        }
    }
}

/// Seeded synthetic workload. Every critical section is closed by the
/// task's last tick of service, so generated runs cannot deadlock.
pub fn bernoulli_tasks(params: &Synthetic, seed: u64) -> Vec<TaskSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tasks = Vec::new();

    for t in 0..params.ticks {
        if rng.random::<f64>() >= params.p_arrival {
            continue;
        }

        let run_time = if rng.random::<f64>() < params.p_short {
            params.short_ticks
        } else {
            params.long_ticks
        };
        let duration = run_time.max(1);

        let mut events = Vec::new();
        if duration >= 2 {
            if rng.random::<f64>() < params.p_io {
                let start = rng.random_range(1..duration);
                let ticks = rng.random_range(1..=params.max_io_ticks.max(1));
                events.push(TaskEvent::io(start, ticks));
            }
            if rng.random::<f64>() < params.p_critical {
                let lock = rng.random_range(1..duration);
                let unlock = rng.random_range(lock + 1..=duration);
                events.push(TaskEvent::lock(lock));
                events.push(TaskEvent::unlock(unlock));
            }
        }
        events.sort_by_key(|event| event.trigger);

        let n = tasks.len();
        tasks.push(TaskSpec {
            id: format!("t{n}"),
            color: PALETTE[n % PALETTE.len()].to_string(),
            arrival: t,
            duration,
            priority: rng.random_range(0..=params.max_priority.max(0)),
            events,
        });
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;

    const SAMPLE: &str = "
        # algorithm;quantum;aging
        PRIOPEnv;2;1

        t1;red;0;5;2;IO:2-1;ML:1;MU:3
        t2;blue;1;3;4;
    ";

    #[test]
    fn parses_line_format() {
        let workload = Workload::parse(SAMPLE).unwrap();
        assert_eq!(workload.config.policy, PolicyKind::PriorityPreemptiveAging);
        assert_eq!(workload.config.quantum, 2);
        assert_eq!(workload.config.aging, 1);
        assert_eq!(workload.tasks.len(), 2);

        let t1 = &workload.tasks[0];
        assert_eq!((t1.arrival, t1.duration, t1.priority), (0, 5, 2));
        assert_eq!(
            t1.events,
            vec![TaskEvent::io(2, 1), TaskEvent::lock(1), TaskEvent::unlock(3)]
        );
        assert!(workload.tasks[1].events.is_empty());
    }

    #[test]
    fn reports_line_of_bad_record() {
        let err = Workload::parse("FCFS;2\nA;red;0;x;1\n").unwrap_err();
        assert!(matches!(err, WorkloadError::Parse { line: 2, .. }));

        let err = Workload::parse("FCFS;2\nA;red;0;3;1;XX:4\n").unwrap_err();
        assert!(err.to_string().contains("unknown event type"));
    }

    #[test]
    fn empty_field_is_named_not_shifted() {
        let err = Workload::parse("FCFS;2\nA;;0;3;1\n").unwrap_err();
        assert!(matches!(err, WorkloadError::Parse { line: 2, .. }));
        assert!(err.to_string().contains("empty color"), "{err}");

        let err = Workload::parse("FCFS;2\nA;red;;3;1\n").unwrap_err();
        assert!(err.to_string().contains("empty arrival"), "{err}");

        let workload = Workload::parse("FCFS;2;\nA;red;0;3;1;;ML:1;\n").unwrap();
        assert_eq!(workload.config.aging, 0);
        assert_eq!(workload.tasks[0].events, vec![TaskEvent::lock(1)]);
    }

    #[test]
    fn rejects_unknown_policy_and_missing_aging() {
        assert!(matches!(
            Workload::parse("RR;2\n"),
            Err(WorkloadError::Policy {
                line: 1,
                source: SchedError::UnsupportedPolicy(_)
            })
        ));
        assert!(matches!(
            Workload::parse("PRIOPEnv;2\n"),
            Err(WorkloadError::Parse { line: 1, .. })
        ));
        assert!(matches!(Workload::parse("# nothing\n"), Err(WorkloadError::Empty)));
    }

    #[test]
    fn loads_json_by_extension() {
        let json = r#"{
            "config": {"policy": "SRTF", "quantum": 0},
            "tasks": [
                {"id": "A", "color": "red", "arrival": 0, "duration": 3,
                 "events": [{"kind": "Io", "trigger": 1, "duration": 2}]}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        fs::write(&path, json).unwrap();

        let workload = Workload::load(&path).unwrap();
        assert_eq!(workload.config.policy, PolicyKind::Srtf);
        assert_eq!(workload.compat, Compat::default());
        assert_eq!(workload.tasks[0].events[0].kind, EventKind::Io);

        let path = dir.path().join("w.txt");
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Workload::load(&path).unwrap().tasks.len(), 2);
    }

    #[test]
    fn generator_is_seeded_and_well_formed() {
        let params = Synthetic {
            ticks: 200,
            p_io: 0.5,
            p_critical: 0.5,
            ..Synthetic::default()
        };
        let tasks = bernoulli_tasks(&params, 7);
        assert_eq!(tasks, bernoulli_tasks(&params, 7));
        assert!(!tasks.is_empty());

        for task in &tasks {
            let lock = task.events.iter().find(|e| e.kind == EventKind::MutexLock);
            let unlock = task.events.iter().find(|e| e.kind == EventKind::MutexUnlock);
            assert_eq!(lock.is_some(), unlock.is_some());
            if let (Some(lock), Some(unlock)) = (lock, unlock) {
                assert!(lock.trigger < unlock.trigger && unlock.trigger <= task.duration);
            }
            assert!(task.events.iter().all(|e| e.kind != EventKind::Io || e.trigger < task.duration));
        }
    }
}
