use std::env;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: replay_scenario <scenario.json>...");
        process::exit(2);
    }

    let mut all_passed = true;
    for path in &paths {
        match tether_eval::evaluate_scenario_path(path) {
            Ok(report) => {
                println!("scenario: {}", report.scenario_name);
                for step in &report.steps {
                    println!(
                        "  [{:>2}] {:<20} {} ({:?})",
                        step.index, step.action, step.status, step.tracking_state
                    );
                }
                println!("final status: {}", report.final_status);
                println!(
                    "sessions created/destroyed: {}/{}",
                    report.counters.sessions_created, report.counters.sessions_destroyed
                );
                if report.passed() {
                    println!("status: PASS");
                    continue;
                }

                all_passed = false;
                println!("status: FAIL");
                for failure in &report.failures {
                    println!("- {failure}");
                }
            }
            Err(err) => {
                all_passed = false;
                eprintln!("{path}: replay failed: {err}");
            }
        }
    }

    process::exit(if all_passed { 0 } else { 1 });
}
