use std::io::{self, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, terminal,
};

use procmon::models::log_entry::LogEntry;
use procmon::{ProcessInfo, ProcessManager};

const HELP: &str = "\
Commands:
  list                 show every job and its status
  start <id>           launch a job
  stop <id>            stop a running job
  status <id>          show the status of a job
  watch <id>           show status and captured output
  clear <id>           clear captured output
  logs <id>            list past runs
  log <id> <log-id>    show one past run
  latest <id>          show the most recent run
  validate <id>        check paths referenced by the job
  config <id>          print the job configuration
  reload               re-read the configuration file
  delete <id>          remove a job that is not running
  exit                 stop all jobs and quit";

pub fn run_cli(manager: &ProcessManager) {
    println!("Process monitor started. Enter a command, 'help' or 'exit' to quit.");
    let mut commands_history: Vec<String> = Vec::new();

    loop {
        let input = match read_command(&commands_history) {
            Ok(Some(input)) => input,
            Ok(None) => break,
            Err(e) => {
                eprintln!("[ERROR]: Failed to read input: {}", e);
                break;
            }
        };
        if input.trim().is_empty() {
            continue;
        }
        commands_history.push(input.clone());

        let mut args = input.split_whitespace();
        let command = args.next();
        let id = args.next();

        match (command, id) {
            (Some("help"), _) => println!("{}", HELP),
            (Some("list"), _) => print_list(&manager.get_all()),
            (Some("reload"), _) => {
                manager.reload_configs();
                println!("Configuration reloaded: {} jobs", manager.get_all().len());
            }
            (Some("exit"), _) => {
                println!("Stopping running jobs and exiting...");
                break;
            }
            (Some(cmd), Some(id)) => run_job_command(manager, cmd, id, args.next()),
            (Some(cmd @ ("start" | "stop" | "status" | "watch" | "clear" | "logs" | "log"
            | "latest" | "validate" | "config" | "delete")), None) => {
                println!("Job ID must be specified for '{}'.", cmd)
            }
            (Some(cmd), None) => println!("Unknown command: {}. Type 'help' for a list.", cmd),
            (None, _) => continue,
        }
    }
}

fn run_job_command(manager: &ProcessManager, command: &str, id: &str, extra: Option<&str>) {
    match command {
        "start" => match manager.start(id) {
            Ok(pid) => println!("Started '{}' with PID {}", id, pid),
            Err(e) => println!("Cannot start: {}", e),
        },
        "stop" => match manager.stop(id) {
            Ok(()) => println!("Sent stop signal to '{}'", id),
            Err(e) => println!("Cannot stop: {}", e),
        },
        "status" => match manager.get(id) {
            Some(info) => print_status(&info),
            None => println!("Job '{}' not found", id),
        },
        "watch" => match manager.get(id) {
            Some(info) => {
                print_status(&info);
                for line in &info.output {
                    println!("{}", line);
                }
            }
            None => println!("Job '{}' not found", id),
        },
        "clear" => match manager.clear_output(id) {
            Ok(()) => println!("Output of '{}' cleared", id),
            Err(e) => println!("Cannot clear: {}", e),
        },
        "logs" => {
            let logs = manager.list_logs(id);
            if logs.is_empty() {
                println!("No runs recorded for '{}'", id);
            }
            for entry in logs {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.log_id,
                    entry.status,
                    entry.start_time.format("%Y-%m-%d %H:%M:%S"),
                    entry
                        .duration_ms
                        .map(|ms| format!("{} ms", ms))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        "log" => match extra {
            Some(log_id) => match manager.get_log(id, log_id) {
                Some(entry) => print_log(&entry),
                None => println!("Log '{}' not found for '{}'", log_id, id),
            },
            None => println!("Log ID must be specified."),
        },
        "latest" => match manager.latest_log(id) {
            Some(entry) => print_log(&entry),
            None => println!("No runs recorded for '{}'", id),
        },
        "validate" => {
            let validation = manager.validate(id);
            if validation.valid {
                println!("'{}' is valid", id);
            }
            for error in validation.errors {
                println!("  - {}", error);
            }
        }
        "config" => match manager.job_config(id) {
            Some(config) => match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("Cannot render configuration: {}", e),
            },
            None => println!("Job '{}' not found", id),
        },
        "delete" => match manager.delete_job(id) {
            Ok(()) => println!("Deleted '{}'", id),
            Err(e) => println!("Cannot delete: {}", e),
        },
        other => println!("Unknown command: {}. Type 'help' for a list.", other),
    }
}

fn print_list(processes: &[ProcessInfo]) {
    if processes.is_empty() {
        println!("No configured jobs");
        return;
    }
    println!("{:<20} {:<10} {:<8} {}", "ID", "Status", "PID", "Name");
    println!("{}", "-".repeat(60));
    for info in processes {
        let pid = info
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "NONE".to_string());
        println!("{:<20} {:<10} {:<8} {}", info.id, info.status, pid, info.name);
    }
}

fn print_status(info: &ProcessInfo) {
    print!("Job {} status: {}", info.id, info.status);
    if let Some(pid) = info.pid {
        print!(", PID {}", pid);
    }
    if let Some(code) = info.exit_code {
        print!(", exit code {}", code);
    }
    println!();
}

fn print_log(entry: &LogEntry) {
    println!(
        "{} ({}) {} exit code {:?}",
        entry.log_id, entry.process_name, entry.status, entry.exit_code
    );
    for line in &entry.output {
        println!("{}", line);
    }
}

/// Reads one line in raw mode with Up/Down history. `None` on Ctrl-C/Ctrl-D.
fn read_command(history: &[String]) -> io::Result<Option<String>> {
    terminal::enable_raw_mode()?;
    let result = edit_line(history);
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn edit_line(history: &[String]) -> io::Result<Option<String>> {
    let mut input = String::new();
    let mut history_index = history.len();
    redraw(&input)?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }
        match key_event.code {
            KeyCode::Enter => return Ok(Some(input)),
            KeyCode::Char('c' | 'd') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(None)
            }
            KeyCode::Up => {
                if history_index > 0 {
                    history_index -= 1;
                    input = history[history_index].clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if history_index < history.len() {
                    history_index += 1;
                    input = history.get(history_index).cloned().unwrap_or_default();
                    redraw(&input)?;
                }
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                io::stdout().flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

fn redraw(input: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    stdout.flush()
}
