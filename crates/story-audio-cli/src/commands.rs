//! Line-oriented command parsing and dispatch for the interactive player.

use story_audio::{PlaybackCoordinator, PlaybackRate, PlaybackSession, StoryAudio};

pub const HELP: &str = "\
commands:
  play <url> <story>     load and play a story (resumes if paused)
  story <json>           play a story payload, e.g. {\"id\":\"s1\",\"audioUrl\":\"a.mp3\"}
  toggle <url> <story>   pause if that story is playing, otherwise play it
  pause | stop
  seek <percent>         jump to a position, 0-100
  volume <0..1>
  mute                   toggle mute
  rate <multiplier>      one of 0.5 0.75 1 1.25 1.5 2
  rates | status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { url: String, story: String },
    Story(StoryAudio),
    Toggle { url: String, story: String },
    Pause,
    Stop,
    Seek(f64),
    Volume(f32),
    Mute,
    Rate(f32),
    Rates,
    Status,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" => {
            let (url, story) = two_args(rest, "play <url> <story>")?;
            Command::Play { url, story }
        }
        "toggle" => {
            let (url, story) = two_args(rest, "toggle <url> <story>")?;
            Command::Toggle { url, story }
        }
        "story" => {
            let story = serde_json::from_str::<StoryAudio>(rest)
                .map_err(|e| format!("invalid story payload: {e}"))?;
            Command::Story(story)
        }
        "pause" => Command::Pause,
        "stop" => Command::Stop,
        "seek" => Command::Seek(number(rest, "seek <percent>")?),
        "volume" | "vol" => Command::Volume(number(rest, "volume <0..1>")?),
        "mute" => Command::Mute,
        "rate" => Command::Rate(number(rest, "rate <multiplier>")?),
        "rates" => Command::Rates,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(cmd))
}

fn two_args(rest: &str, usage: &str) -> Result<(String, String), String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a.to_string(), b.to_string())),
        _ => Err(format!("usage: {usage}")),
    }
}

fn number<T: std::str::FromStr>(rest: &str, usage: &str) -> Result<T, String> {
    rest.parse::<T>().map_err(|_| format!("usage: {usage}"))
}

/// Run one command; returns `false` when the player should exit.
pub fn execute(coordinator: &PlaybackCoordinator, cmd: Command) -> bool {
    let result = match cmd {
        Command::Play { url, story } => coordinator.play(&url, &story).map(|outcome| {
            tracing::debug!(?outcome, "play accepted");
        }),
        Command::Story(story) => coordinator
            .play(&story.audio_url, &story.story_id)
            .map(|_| ()),
        Command::Toggle { url, story } => coordinator
            .toggle(&url, &story)
            .map(|status| println!("{story}: {status:?}")),
        Command::Pause => coordinator.pause(),
        Command::Stop => coordinator.stop(),
        Command::Seek(percent) => coordinator.seek(percent).map(|position| match position {
            Some(sec) => println!("position {sec:.1}s"),
            None => println!("nothing to seek"),
        }),
        Command::Volume(volume) => coordinator
            .set_volume(volume)
            .map(|stored| println!("volume {stored:.2}")),
        Command::Mute => coordinator
            .toggle_mute()
            .map(|muted| println!("{}", if muted { "muted" } else { "unmuted" })),
        Command::Rate(rate) => coordinator
            .set_playback_rate(rate)
            .map(|rate| println!("rate {rate}")),
        Command::Rates => {
            let rates: Vec<String> = PlaybackRate::PRESETS.iter().map(|r| r.to_string()).collect();
            println!("{}", rates.join(" "));
            Ok(())
        }
        Command::Status => {
            println!("{}", describe(&coordinator.snapshot()));
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(err) = result {
        println!("error: {err}");
    }
    true
}

/// One-line human summary of a session.
pub fn describe(session: &PlaybackSession) -> String {
    let view = session.view();
    let mut line = format!(
        "{:?} story={} {:.1}/{:.1}s ({:.0}%) volume={:.2}{} rate={}",
        view.status,
        view.active_story_id.as_deref().unwrap_or("-"),
        view.current_time_sec,
        view.duration_sec,
        view.progress_percent,
        view.volume,
        if view.is_muted { " (muted)" } else { "" },
        view.playback_rate,
    );
    if let Some(err) = session.last_error.as_deref() {
        line.push_str(&format!(" last_error={err:?}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_two_arguments() {
        assert_eq!(
            parse("play a.mp3 s1").unwrap(),
            Some(Command::Play {
                url: "a.mp3".to_string(),
                story: "s1".to_string()
            })
        );
        assert!(parse("play a.mp3").is_err());
        assert!(parse("play a.mp3 s1 extra").is_err());
    }

    #[test]
    fn parses_numeric_commands() {
        assert_eq!(parse("seek 50").unwrap(), Some(Command::Seek(50.0)));
        assert_eq!(parse("VOLUME 0.3").unwrap(), Some(Command::Volume(0.3)));
        assert_eq!(parse("rate 1.25").unwrap(), Some(Command::Rate(1.25)));
        assert!(parse("seek half").is_err());
    }

    #[test]
    fn parses_story_payload() {
        let cmd = parse(r#"story {"storyId":"s9","audio_file":"n.mp3"}"#).unwrap();
        assert_eq!(
            cmd,
            Some(Command::Story(StoryAudio {
                story_id: "s9".to_string(),
                audio_url: "n.mp3".to_string()
            }))
        );
    }

    #[test]
    fn blank_lines_and_unknown_words() {
        assert_eq!(parse("   ").unwrap(), None);
        assert!(parse("rewind").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn describe_includes_status_and_story() {
        let session = PlaybackSession {
            active_story_id: Some("s1".to_string()),
            audio_url: Some("a.mp3".to_string()),
            status: story_audio::PlaybackStatus::Playing,
            current_time_sec: 30.0,
            duration_sec: 60.0,
            ..PlaybackSession::default()
        };
        let line = describe(&session);
        assert!(line.starts_with("Playing story=s1"));
        assert!(line.contains("(50%)"));
    }
}
