//! REPL – the interactive armview shell.
//!
//! Supported slash-commands:
//!   /help                          – show this list
//!   /state                         – print the arm snapshot
//!   /mode translate|rotate         – switch control mode (payload resets)
//!   /set <x|y|z> <value>           – edit the active mode's vector
//!   /set target|euler <axis> <v>   – edit a named vector explicitly
//!   /target                        – aim the translate target at the tip
//!   /move                          – send the active mode to the solver
//!   /joints <θ0> <θ1> <θ2> <θ3> <θ4> – request new joint angles
//!   /quit | /exit                  – leave

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use armview_runtime::ArmSession;
use armview_types::protocol::MoveEndEffectorResponse;
use armview_types::{ArmSnapshot, Axis, ControlMode, KinematicState, ModeField, ModeKind};
use colored::Colorize;
use tokio::runtime::Runtime;

/// A parsed shell line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplCommand {
    Help,
    State,
    Mode(ModeKind),
    /// `vector` is `None` when the active mode's vector is meant.
    Set {
        vector: Option<ModeKind>,
        axis: Axis,
        value: f64,
    },
    Target,
    Move,
    Joints([f64; 5]),
    Quit,
}

fn parse_number(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("'{raw}' is not a number"))
}

fn parse_vector(raw: &str) -> Option<ModeKind> {
    match raw.to_ascii_lowercase().as_str() {
        "target" | "translate" => Some(ModeKind::TranslateEndEffector),
        "euler" | "rotate" => Some(ModeKind::RotateEndEffector),
        _ => None,
    }
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = words.collect();

        match (head, args.as_slice()) {
            ("/help", []) => Ok(ReplCommand::Help),
            ("/state", []) => Ok(ReplCommand::State),
            ("/target", []) => Ok(ReplCommand::Target),
            ("/move", []) => Ok(ReplCommand::Move),
            ("/quit" | "/exit", []) => Ok(ReplCommand::Quit),
            ("/mode", [kind]) => parse_vector(kind)
                .map(ReplCommand::Mode)
                .ok_or_else(|| format!("unknown mode '{kind}' (expected translate or rotate)")),
            ("/mode", _) => Err("usage: /mode translate|rotate".to_string()),
            ("/set", [axis, value]) => Ok(ReplCommand::Set {
                vector: None,
                axis: axis.parse()?,
                value: parse_number(value)?,
            }),
            ("/set", [vector, axis, value]) => Ok(ReplCommand::Set {
                vector: Some(
                    parse_vector(vector)
                        .ok_or_else(|| format!("unknown vector '{vector}' (expected target or euler)"))?,
                ),
                axis: axis.parse()?,
                value: parse_number(value)?,
            }),
            ("/set", _) => Err("usage: /set [target|euler] <x|y|z> <value>".to_string()),
            ("/joints", raw) if raw.len() == 5 => {
                let mut angles = [0.0; 5];
                for (slot, raw) in angles.iter_mut().zip(raw) {
                    *slot = parse_number(raw)?;
                }
                Ok(ReplCommand::Joints(angles))
            }
            ("/joints", _) => Err("usage: /joints <θ0> <θ1> <θ2> <θ3> <θ4>".to_string()),
            (other, _) => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Run the shell until `/quit`, end of input or `shutdown` is raised.
///
/// Async session calls are driven to completion on `runtime`.
pub fn run(runtime: &Runtime, session: &ArmSession, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "armview>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ReplCommand::parse(line) {
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => execute(runtime, session, command),
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e,
                "/help".bold()
            ),
        }
    }
}

fn execute(runtime: &Runtime, session: &ArmSession, command: ReplCommand) {
    match command {
        ReplCommand::Help => cmd_help(),
        ReplCommand::State => print_snapshot(&session.arm().read(), session),
        ReplCommand::Mode(kind) => {
            session.control().switch_to(kind);
            print_mode(&session.control().read());
        }
        ReplCommand::Set {
            vector,
            axis,
            value,
        } => {
            let kind = vector.unwrap_or_else(|| session.control().read().kind());
            let field = match kind {
                ModeKind::TranslateEndEffector => ModeField::Target(axis),
                ModeKind::RotateEndEffector => ModeField::Euler(axis),
            };
            match session.control().update_field(field, value) {
                Ok(mode) => print_mode(&mode),
                Err(e) => println!("{} {}", "Rejected:".red(), e),
            }
        }
        ReplCommand::Target => match session.target_current_end_effector() {
            Ok(mode) => print_mode(&mode),
            Err(e) => println!("{} {}", "Not yet:".yellow(), e),
        },
        ReplCommand::Move => match runtime.block_on(session.begin_motion()) {
            Ok(MoveEndEffectorResponse::Reached {
                delta_position_magnitude,
                iterations,
            }) => println!(
                "  {} reached (Δ {:.4}, {} iteration(s))",
                "✓".green().bold(),
                delta_position_magnitude,
                iterations
            ),
            Ok(MoveEndEffectorResponse::Unreachable) => {
                println!("  {} target is unreachable", "✗".red().bold())
            }
            Err(e) => println!("{}: {}", "Motion failed".red(), e),
        },
        ReplCommand::Joints(angles) => {
            let state = KinematicState::from_angles(angles);
            match runtime.block_on(session.update_kinematic_state(state)) {
                Ok(()) => println!("  {} joint angles sent", "✓".green()),
                Err(e) => println!("{}: {}", "Update failed".red(), e),
            }
        }
        ReplCommand::Quit => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "armview Commands".bold().underline());
    println!("  {}                      – print the arm state", "/state".bold().cyan());
    println!("  {}     – switch control mode", "/mode translate|rotate".bold().cyan());
    println!("  {}    – edit the active mode's vector", "/set <x|y|z> <value>".bold().cyan());
    println!("  {} – edit a named vector", "/set target|euler <axis> <v>".bold().cyan());
    println!("  {}                     – aim at the current tip", "/target".bold().cyan());
    println!("  {}                       – send the active mode", "/move".bold().cyan());
    println!("  {}  – request new joint angles", "/joints <θ0> … <θ4>".bold().cyan());
    println!("  {}                – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_snapshot(snapshot: &ArmSnapshot, session: &ArmSession) {
    if snapshot.is_loading {
        println!(
            "  {} (bootstrap: {:?})",
            "loading…".yellow(),
            session.arm().status()
        );
    }
    let p = &snapshot.kinematic_parameters;
    println!(
        "  {} {:.3} {:.3} {:.3} {:.3} {:.3}",
        "links :".bold(),
        p.l_0,
        p.l_1,
        p.l_2,
        p.l_3,
        p.l_4
    );
    let angles = snapshot.kinematic_state.angles();
    println!(
        "  {} {:.3} {:.3} {:.3} {:.3} {:.3}",
        "joints:".bold(),
        angles[0],
        angles[1],
        angles[2],
        angles[3],
        angles[4]
    );
    for (i, v) in snapshot.vertices.iter().enumerate() {
        println!("  {} ({:.3}, {:.3}, {:.3})", format!("v{i}    :").dimmed(), v.x, v.y, v.z);
    }
}

fn print_mode(mode: &ControlMode) {
    match mode {
        ControlMode::TranslateEndEffector { target_position: t } => println!(
            "  {} target ({:.3}, {:.3}, {:.3})",
            "translate".bold(),
            t.x,
            t.y,
            t.z
        ),
        ControlMode::RotateEndEffector { euler_angles: e } => println!(
            "  {} euler ({:.3}, {:.3}, {:.3})",
            "rotate".bold(),
            e.x,
            e.y,
            e.z
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_commands() {
        assert_eq!(ReplCommand::parse("/state"), Ok(ReplCommand::State));
        assert_eq!(ReplCommand::parse("/move"), Ok(ReplCommand::Move));
        assert_eq!(ReplCommand::parse("/target"), Ok(ReplCommand::Target));
        assert_eq!(ReplCommand::parse("  /exit "), Ok(ReplCommand::Quit));
        assert!(ReplCommand::parse("/state now").is_err());
    }

    #[test]
    fn mode_switch() {
        assert_eq!(
            ReplCommand::parse("/mode rotate"),
            Ok(ReplCommand::Mode(ModeKind::RotateEndEffector))
        );
        assert_eq!(
            ReplCommand::parse("/mode Translate"),
            Ok(ReplCommand::Mode(ModeKind::TranslateEndEffector))
        );
        assert!(ReplCommand::parse("/mode spin").is_err());
        assert!(ReplCommand::parse("/mode").is_err());
    }

    #[test]
    fn set_targets_active_or_named_vector() {
        assert_eq!(
            ReplCommand::parse("/set y -1.5"),
            Ok(ReplCommand::Set {
                vector: None,
                axis: Axis::Y,
                value: -1.5
            })
        );
        assert_eq!(
            ReplCommand::parse("/set euler z 90"),
            Ok(ReplCommand::Set {
                vector: Some(ModeKind::RotateEndEffector),
                axis: Axis::Z,
                value: 90.0
            })
        );
        assert!(ReplCommand::parse("/set w 1").is_err());
        assert!(ReplCommand::parse("/set x far").is_err());
        assert!(ReplCommand::parse("/set x NaN").is_err());
        assert!(ReplCommand::parse("/set x").is_err());
    }

    #[test]
    fn joints_need_five_angles() {
        assert_eq!(
            ReplCommand::parse("/joints 0 10 20 30 40"),
            Ok(ReplCommand::Joints([0.0, 10.0, 20.0, 30.0, 40.0]))
        );
        assert!(ReplCommand::parse("/joints 0 10 20 30").is_err());
        assert!(ReplCommand::parse("/joints 0 10 20 30 x").is_err());
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = ReplCommand::parse("/launch").unwrap_err();
        assert!(err.contains("/launch"));
    }
}
