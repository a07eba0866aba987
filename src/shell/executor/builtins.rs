//! Builtin delegates: commands the shell handles by calling one external
//! action. Each delegate validates its arguments before acting and runs in
//! the forked child, exactly like an external program would.

use std::env;
use std::io::Write;
use std::path::Path;
use std::process::{self, Stdio};

use log::debug;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::shell::error::BuiltinError;

pub trait Builtin {
    fn name(&self) -> &'static str;
    fn run(&self, args: &[String]) -> Result<(), BuiltinError>;
}

/// Name to delegate lookup consulted by the executor and the completer.
pub struct BuiltinRegistry {
    builtins: Vec<Box<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self {
            builtins: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Wiki));
        registry.register(Box::new(Volume));
        registry.register(Box::new(Alarm));
        registry.register(Box::new(MyJobs));
        registry.register(Box::new(Pause));
        registry
    }

    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, builtin: Box<dyn Builtin>) {
        self.builtins.retain(|b| b.name() != builtin.name());
        self.builtins.push(builtin);
    }

    pub fn has(&self, name: &str) -> bool {
        self.builtins.iter().any(|b| b.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.builtins.iter().map(|b| b.name())
    }

    pub fn invoke(&self, name: &str, args: &[String]) -> Result<(), BuiltinError> {
        let builtin = self
            .builtins
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| BuiltinError::Unknown(name.to_string()))?;
        debug!("invoking builtin {} {:?}", name, args);
        builtin.run(args)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn run_program(program: &'static str, args: &[&str]) -> Result<(), BuiltinError> {
    let status = process::Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|source| BuiltinError::Launch { program, source })?;
    if status.success() {
        Ok(())
    } else {
        Err(BuiltinError::Failed {
            program,
            status: status.code().unwrap_or(1),
        })
    }
}

const WIKI_URL: &str = "https://www.wikipedia.org/wiki/";

/// `wiki [topic]` opens the topic's page, or the home page without a topic.
pub struct Wiki;

impl Wiki {
    fn url(args: &[String]) -> String {
        match args.first() {
            Some(topic) => format!("{}{}", WIKI_URL, topic),
            None => WIKI_URL.to_string(),
        }
    }
}

impl Builtin for Wiki {
    fn name(&self) -> &'static str {
        "wiki"
    }

    fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
        run_program("xdg-open", &[&Wiki::url(args)])
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum VolumeAction {
    Up,
    Down,
    Mute,
    Unmute,
}

impl VolumeAction {
    const USAGE: &'static str = "volume up|down|mute|unmute";

    fn parse(args: &[String]) -> Result<Self, BuiltinError> {
        let arg = args.first().ok_or(BuiltinError::MissingArgument {
            builtin: "volume",
            usage: Self::USAGE,
        })?;
        match arg.as_str() {
            "up" => Ok(VolumeAction::Up),
            "down" => Ok(VolumeAction::Down),
            "mute" => Ok(VolumeAction::Mute),
            "unmute" => Ok(VolumeAction::Unmute),
            other => Err(BuiltinError::InvalidArgument {
                builtin: "volume",
                value: other.to_string(),
                reason: "expected up, down, mute or unmute",
            }),
        }
    }

    fn level(self) -> &'static str {
        match self {
            VolumeAction::Up => "5%+",
            VolumeAction::Down => "5%-",
            VolumeAction::Mute => "0%",
            VolumeAction::Unmute => "50%",
        }
    }

    fn message(self) -> &'static str {
        match self {
            VolumeAction::Up => "volume is up",
            VolumeAction::Down => "volume is down",
            VolumeAction::Mute => "muted",
            VolumeAction::Unmute => "unmuted",
        }
    }
}

/// `volume up|down|mute|unmute` via amixer on the pulse master channel.
pub struct Volume;

impl Builtin for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
        let action = VolumeAction::parse(args)?;
        println!("{}", action.message());
        run_program(
            "amixer",
            &["-D", "pulse", "sset", "Master", action.level(), "--quiet"],
        )
    }
}

/// `alarm HH.MM <sound-file>` schedules a daily crontab entry playing the file.
pub struct Alarm;

impl Alarm {
    const USAGE: &'static str = "alarm HH.MM <sound-file>";

    fn parse_time(value: &str) -> Result<(u32, u32), BuiltinError> {
        let invalid = |reason| BuiltinError::InvalidArgument {
            builtin: "alarm",
            value: value.to_string(),
            reason,
        };
        let (hour, minute) = value
            .split_once('.')
            .ok_or_else(|| invalid("expected HH.MM"))?;
        let hour: u32 = hour.parse().map_err(|_| invalid("hour is not a number"))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| invalid("minute is not a number"))?;
        if hour > 23 || minute > 59 {
            return Err(invalid("time out of range"));
        }
        Ok((hour, minute))
    }

    /// Current crontab from `crontab -l`. Only a missing crontab counts as
    /// empty; any other failure aborts so the table is never overwritten.
    fn existing_table(listing: &process::Output) -> Result<String, BuiltinError> {
        if listing.status.success() {
            return Ok(String::from_utf8_lossy(&listing.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&listing.stderr);
        if stderr.to_ascii_lowercase().contains("no crontab") {
            debug!("no crontab yet, starting empty");
            return Ok(String::new());
        }
        Err(BuiltinError::Failed {
            program: "crontab",
            status: listing.status.code().unwrap_or(1),
        })
    }

    /// The crontab line for the request; the sound file must exist.
    fn entry(args: &[String]) -> Result<String, BuiltinError> {
        let (Some(time), Some(file)) = (args.first(), args.get(1)) else {
            return Err(BuiltinError::MissingArgument {
                builtin: "alarm",
                usage: Self::USAGE,
            });
        };
        let (hour, minute) = Self::parse_time(time)?;
        let sound = Path::new(file)
            .canonicalize()
            .map_err(|_| BuiltinError::InvalidArgument {
                builtin: "alarm",
                value: file.clone(),
                reason: "no such file",
            })?;
        Ok(format!(
            "{} {} * * * mpg321 {}",
            minute,
            hour,
            sound.display()
        ))
    }
}

impl Builtin for Alarm {
    fn name(&self) -> &'static str {
        "alarm"
    }

    fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
        let entry = Self::entry(args)?;
        let listing = process::Command::new("crontab")
            .arg("-l")
            .output()
            .map_err(|source| BuiltinError::Launch {
                program: "crontab",
                source,
            })?;
        let mut table = Self::existing_table(&listing)?;
        if !table.is_empty() && !table.ends_with('\n') {
            table.push('\n');
        }
        table.push_str(&entry);
        table.push('\n');

        let mut child = process::Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| BuiltinError::Launch {
                program: "crontab",
                source,
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(table.as_bytes())
                .map_err(|source| BuiltinError::Launch {
                    program: "crontab",
                    source,
                })?;
        }
        let status = child.wait().map_err(|source| BuiltinError::Launch {
            program: "crontab",
            source,
        })?;
        if !status.success() {
            return Err(BuiltinError::Failed {
                program: "crontab",
                status: status.code().unwrap_or(1),
            });
        }
        println!("alarm set: {}", entry);
        Ok(())
    }
}

/// `myjobs` lists the current user's processes.
pub struct MyJobs;

impl Builtin for MyJobs {
    fn name(&self) -> &'static str {
        "myjobs"
    }

    fn run(&self, _args: &[String]) -> Result<(), BuiltinError> {
        let user = env::var("USER").map_err(|_| BuiltinError::InvalidArgument {
            builtin: "myjobs",
            value: "USER".to_string(),
            reason: "environment variable is not set",
        })?;
        run_program("ps", &["-u", &user])
    }
}

/// `pause <pid>` stops a process. There is no matching resume builtin.
pub struct Pause;

impl Pause {
    fn pid(args: &[String]) -> Result<Pid, BuiltinError> {
        let arg = args.first().ok_or(BuiltinError::MissingArgument {
            builtin: "pause",
            usage: "pause <pid>",
        })?;
        match arg.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Pid::from_raw(pid)),
            _ => Err(BuiltinError::InvalidArgument {
                builtin: "pause",
                value: arg.clone(),
                reason: "expected a positive process id",
            }),
        }
    }
}

impl Builtin for Pause {
    fn name(&self) -> &'static str {
        "pause"
    }

    fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
        let pid = Self::pid(args)?;
        kill(pid, Signal::SIGSTOP).map_err(BuiltinError::Signal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    struct Echo;

    impl Builtin for Echo {
        fn name(&self) -> &'static str {
            "wiki"
        }

        fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
            if args.is_empty() {
                Err(BuiltinError::MissingArgument {
                    builtin: "wiki",
                    usage: "wiki <x>",
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = BuiltinRegistry::with_defaults();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["wiki", "volume", "alarm", "myjobs", "pause"]);
        assert!(registry.has("pause"));
        assert!(!registry.has("cd"));
        assert!(!registry.has("psvis"));
        assert!(matches!(
            registry.invoke("psvis", &[]),
            Err(BuiltinError::Unknown(name)) if name == "psvis"
        ));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = BuiltinRegistry::with_defaults();
        registry.register(Box::new(Echo));
        assert_eq!(registry.names().filter(|n| *n == "wiki").count(), 1);
        assert!(registry.invoke("wiki", &strings(&["x"])).is_ok());
        assert!(matches!(
            registry.invoke("wiki", &[]),
            Err(BuiltinError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_wiki_url() {
        assert_eq!(
            Wiki::url(&strings(&["Rust"])),
            "https://www.wikipedia.org/wiki/Rust"
        );
        assert_eq!(Wiki::url(&[]), "https://www.wikipedia.org/wiki/");
    }

    #[test]
    fn test_volume_arguments() {
        assert_eq!(
            VolumeAction::parse(&strings(&["up"])).unwrap().level(),
            "5%+"
        );
        assert_eq!(
            VolumeAction::parse(&strings(&["unmute"])).unwrap(),
            VolumeAction::Unmute
        );
        assert!(matches!(
            VolumeAction::parse(&[]),
            Err(BuiltinError::MissingArgument { .. })
        ));
        assert!(matches!(
            VolumeAction::parse(&strings(&["loud"])),
            Err(BuiltinError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_alarm_entry() {
        let dir = tempfile::tempdir().unwrap();
        let sound = dir.path().join("wake.mp3");
        std::fs::File::create(&sound).unwrap();
        let sound = sound.canonicalize().unwrap();

        let entry = Alarm::entry(&strings(&["7.05", sound.to_str().unwrap()])).unwrap();
        assert_eq!(entry, format!("5 7 * * * mpg321 {}", sound.display()));

        assert!(matches!(
            Alarm::entry(&strings(&["7.05"])),
            Err(BuiltinError::MissingArgument { .. })
        ));
        assert!(Alarm::entry(&strings(&["25.00", sound.to_str().unwrap()])).is_err());
        assert!(Alarm::entry(&strings(&["seven", sound.to_str().unwrap()])).is_err());
        assert!(Alarm::entry(&strings(&["7.05", "/no/such/file.mp3"])).is_err());
    }

    fn listing(code: i32, stdout: &str, stderr: &str) -> process::Output {
        process::Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_alarm_existing_table() {
        let table = Alarm::existing_table(&listing(0, "0 6 * * * backup\n", "")).unwrap();
        assert_eq!(table, "0 6 * * * backup\n");

        let empty = Alarm::existing_table(&listing(1, "", "no crontab for ada\n")).unwrap();
        assert!(empty.is_empty());

        assert!(matches!(
            Alarm::existing_table(&listing(1, "", "crontab: permission denied\n")),
            Err(BuiltinError::Failed { status: 1, .. })
        ));
    }

    #[test]
    fn test_pause_requires_pid() {
        assert!(matches!(
            Pause.run(&[]),
            Err(BuiltinError::MissingArgument { .. })
        ));
        assert!(matches!(
            Pause::pid(&strings(&["abc"])),
            Err(BuiltinError::InvalidArgument { .. })
        ));
        assert!(Pause::pid(&strings(&["0"])).is_err());
        assert_eq!(Pause::pid(&strings(&["42"])).unwrap(), Pid::from_raw(42));
    }
}
