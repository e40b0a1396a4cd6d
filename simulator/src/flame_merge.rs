use prelude::flame::{self, Span};
use std::fs::File;
use std::io;
use std::mem;

/// Writes the spans recorded on this thread to `flame-graph.html` and prints the time spent in
/// each stage, with repeated spans merged.
pub fn write_flame() -> io::Result<()> {
    let spans = flame::spans();
    if spans.is_empty() {
        return Ok(());
    }
    flame::dump_html(&mut File::create("flame-graph.html")?)?;

    println!("time per stage (total/ms, count):");
    print_stages(&merge_spans(spans), 0);
    Ok(())
}

fn print_stages(stages: &[Stage], depth: usize) {
    for stage in stages {
        println!(
            "{:indent$}{} {:.1} {}",
            "",
            stage.name,
            stage.total_ns as f64 * 1e-6,
            stage.count,
            indent = 2 * depth
        );
        print_stages(&stage.children, depth + 1);
    }
}

#[derive(Debug)]
struct Stage {
    name: String,
    total_ns: u64,
    count: usize,
    children: Vec<Stage>,
}

/// Collapses sibling spans with the same name into one stage, summing their durations.
fn merge_spans(spans: Vec<Span>) -> Vec<Stage> {
    let mut merged: Vec<(Stage, Vec<Span>)> = Vec::new();
    for mut span in spans {
        let children = mem::replace(&mut span.children, Vec::new());
        match merged.iter_mut().find(|(stage, _)| stage.name == span.name) {
            Some((stage, grouped)) => {
                stage.total_ns += span.delta;
                stage.count += 1;
                grouped.extend(children);
            }
            None => merged.push((
                Stage {
                    name: span.name.to_string(),
                    total_ns: span.delta,
                    count: 1,
                    children: Vec::new(),
                },
                children,
            )),
        }
    }

    merged
        .into_iter()
        .map(|(mut stage, children)| {
            stage.children = merge_spans(children);
            stage
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_ticks_merge_into_one_stage() {
        flame::clear();
        for _ in 0..3 {
            let _tick = flame::start_guard("control tick");
            {
                let _plan = flame::start_guard("mpc plan");
            }
            {
                let _plan = flame::start_guard("mpc plan");
            }
        }
        {
            let _report = flame::start_guard("report");
        }

        let stages = merge_spans(flame::spans());

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "control tick");
        assert_eq!(stages[0].count, 3);
        assert_eq!(stages[0].children.len(), 1);
        assert_eq!(stages[0].children[0].name, "mpc plan");
        assert_eq!(stages[0].children[0].count, 6);
        assert_eq!(stages[1].name, "report");
        assert!(stages[0].total_ns >= stages[0].children[0].total_ns);
    }
}
