//! Line commands read from stdin.

use thiserror::Error;

use digraph::controller::Controller;
use digraph::view::RenderSurface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start(String),
    Stop(String),
    Expand(String),
    Collapse(String),
    ExpandAll,
    CollapseAll,
    Select(String),
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("`{0}` needs a node id")]
    MissingId(String),
    #[error("`{0}` takes at most one argument")]
    TooManyArgs(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Redraw,
    Quit,
}

pub const HELP: &str = "\
Commands:
  start <id>        Ask the server to start a node
  stop <id>         Ask the server to stop a node
  expand <id>       Open a node panel and stream its log
  collapse <id>     Close a node panel
  expand-all        Open every panel
  collapse-all      Close every panel
  select <id>       Select a node
  show              Redraw now
  help              This text
  quit              Exit";

/// Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Input>, InputError> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let arg = words.next().map(str::to_string);
    let extra = words.next().is_some();

    let make: fn(String) -> Input = match cmd {
        "start" => Input::Start,
        "stop" => Input::Stop,
        "expand" => Input::Expand,
        "collapse" => Input::Collapse,
        "select" => Input::Select,
        "expand-all" => return bare(cmd, Input::ExpandAll, arg),
        "collapse-all" => return bare(cmd, Input::CollapseAll, arg),
        "show" => return bare(cmd, Input::Show, arg),
        "help" | "?" => return bare(cmd, Input::Help, arg),
        "quit" | "exit" => return bare(cmd, Input::Quit, arg),
        other => return Err(InputError::Unknown(other.to_string())),
    };

    if extra {
        return Err(InputError::TooManyArgs(cmd.to_string()));
    }
    match arg {
        Some(id) => Ok(Some(make(id))),
        None => Err(InputError::MissingId(cmd.to_string())),
    }
}

fn bare(cmd: &str, input: Input, arg: Option<String>) -> Result<Option<Input>, InputError> {
    match arg {
        Some(_) => Err(InputError::TooManyArgs(cmd.to_string())),
        None => Ok(Some(input)),
    }
}

pub fn apply<S: RenderSurface + 'static>(controller: &mut Controller<S>, input: Input) -> Flow {
    match input {
        Input::Start(id) => controller.start_node(&id),
        Input::Stop(id) => controller.stop_node(&id),
        Input::Expand(id) => {
            controller.expand_panel(&id);
        }
        Input::Collapse(id) => {
            controller.collapse_panel(&id);
        }
        Input::ExpandAll => controller.expand_all(),
        Input::CollapseAll => controller.collapse_all(),
        Input::Select(id) => {
            controller.node_clicked(&id);
        }
        Input::Show => return Flow::Redraw,
        Input::Help => println!("{HELP}"),
        Input::Quit => return Flow::Quit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use digraph::prelude::*;

    #[test]
    fn parses_node_commands() {
        assert_eq!(parse("start api"), Ok(Some(Input::Start("api".into()))));
        assert_eq!(parse("  stop   db "), Ok(Some(Input::Stop("db".into()))));
        assert_eq!(parse("expand-all"), Ok(Some(Input::ExpandAll)));
        assert_eq!(parse("exit"), Ok(Some(Input::Quit)));
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_arity_and_unknown_words() {
        assert_eq!(parse("start"), Err(InputError::MissingId("start".into())));
        assert_eq!(parse("select a b"), Err(InputError::TooManyArgs("select".into())));
        assert_eq!(parse("show now"), Err(InputError::TooManyArgs("show".into())));
        assert_eq!(parse("restart api"), Err(InputError::Unknown("restart".into())));
    }

    #[test]
    fn apply_drives_the_controller() {
        let (handle, mut far) = ChannelHandle::detached();
        far.set_status(ConnectionStatus::Open);
        let mut c = Controller::new(MemorySurface::new(), handle, &ClientConfig::default());
        c.handle_text(r#"["add",[{"id":"api"}]]"#);

        assert_eq!(apply(&mut c, Input::Start("api".into())), Flow::Continue);
        assert_eq!(apply(&mut c, Input::Expand("api".into())), Flow::Continue);
        assert_eq!(
            far.drain_commands(),
            vec![
                Command::StartNode("api".into()),
                Command::SubscribeNode("api".into())
            ]
        );
        assert_eq!(apply(&mut c, Input::Show), Flow::Redraw);
        assert_eq!(apply(&mut c, Input::Quit), Flow::Quit);
    }
}
