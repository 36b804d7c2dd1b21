#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

/// Commands whose whole remainder is a single free-text argument.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "bg",
        action: "replace_background",
        arg_key: "color",
    },
    CommandSpec {
        command: "edit",
        action: "edit",
        arg_key: "prompt",
    },
    CommandSpec {
        command: "ratio",
        action: "set_aspect_ratio",
        arg_key: "ratio",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "open",
        action: "open_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "export",
        action: "export",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "enhance",
        action: "enhance",
        arg_key: "",
    },
    CommandSpec {
        command: "passport",
        action: "passport",
        arg_key: "",
    },
    CommandSpec {
        command: "analyze",
        action: "analyze",
        arg_key: "",
    },
    CommandSpec {
        command: "save",
        action: "save",
        arg_key: "",
    },
    CommandSpec {
        command: "history",
        action: "history",
        arg_key: "",
    },
    CommandSpec {
        command: "dismiss",
        action: "dismiss",
        arg_key: "",
    },
    CommandSpec {
        command: "status",
        action: "status",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/bg",
    "/edit",
    "/ratio",
    "/enhance",
    "/passport",
    "/analyze",
    "/save",
    "/history",
    "/export",
    "/open",
    "/dismiss",
    "/status",
    "/help",
    "/quit",
];
