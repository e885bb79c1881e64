use teloxide::types::BotCommand;

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    hidden: bool,
}

pub static COMMANDS: &[Command] = &[
    Command {
        callname: "/start",
        description: "Say hi and see what this bot does.",
        hidden: true,
    },
    Command {
        callname: "/help",
        description: "Show the list of commands.",
        hidden: false,
    },
    Command {
        callname: "/register",
        description: "Register your project, or update it if it's already registered.",
        hidden: false,
    },
    Command {
        callname: "/browse",
        description: "Look at other projects and like the ones you want to collab with.",
        hidden: false,
    },
    Command {
        callname: "/matches",
        description: "See the projects you matched with.",
        hidden: false,
    },
    Command {
        callname: "/status",
        description: "See your registered projects.",
        hidden: false,
    },
    Command {
        callname: "/botsetup",
        description: "Check that the bot can post match announcements in your group and channel.",
        hidden: false,
    },
    Command {
        callname: "/unregister &lt;contract&gt;",
        description: "Remove your project, along with its likes and matches.",
        hidden: false,
    },
    Command {
        callname: "/stats",
        description: "Bot statistics, for the operator.",
        hidden: true,
    },
];

impl Command {
    pub fn generate_help() -> String {
        let mut response = String::from(concat!(
            "💕 <b>Token matchmaking</b>\n\n",
            "Register your project, browse others, and like the ones you'd do an AMA with. ",
            "When two projects like each other, it's a match: both teams get each other's ",
            "details, and the match is announced in both communities.\n\n",
        ));
        for command in COMMANDS.iter().filter(|x| !x.hidden) {
            response += command.callname;
            response += " - ";
            response += command.description;
            response += "\n";
        }
        response.pop();
        response
    }

    pub fn generate_bot_commands() -> Vec<BotCommand> {
        let mut output = Vec::new();

        for command in COMMANDS.iter().filter(|x| !x.hidden) {
            let Some(callname) = command.callname.split_ascii_whitespace().next() else {
                continue;
            };

            // Cut off the /
            let callname = callname[1..].trim().to_string();
            output.push(BotCommand::new(callname, command.description));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_bot_commands() {
        let commands = Command::generate_bot_commands();
        // https://core.telegram.org/bots/api#setmycommands
        assert!(commands.len() <= 100);
        for command in commands {
            // https://core.telegram.org/bots/api#botcommand
            assert!(!command.command.is_empty());
            assert!(command.command.len() <= 32);
            assert!(command
                .command
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));

            assert!(!command.description.is_empty());
            assert!(command.description.len() <= 256);
            assert!(!command.description.contains("&lt;"));
        }
    }

    #[test]
    fn help_hides_hidden_commands() {
        let help = Command::generate_help();
        assert!(help.contains("/unregister &lt;contract&gt;"));
        assert!(!help.contains("/stats"));
        assert!(!help.contains("/start"));
    }
}
