#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    /// Key the argument is stored under in `Intent::command_args`.
    pub arg_key: &'static str,
}

/// Commands whose argument is taken verbatim.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "model",
        action: "set_model",
        arg_key: "model",
    },
    CommandSpec {
        command: "layout",
        action: "set_layout",
        arg_key: "layout",
    },
    CommandSpec {
        command: "panel",
        action: "toggle_panel",
        arg_key: "panel",
    },
];

/// Commands taking one path or URL; quoting is honoured.
pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scene",
        action: "import_scene",
        arg_key: "source",
    },
    CommandSpec {
        command: "product",
        action: "import_product",
        arg_key: "source",
    },
    CommandSpec {
        command: "download",
        action: "download",
        arg_key: "path",
    },
];

pub(crate) const CAMERA_COMMAND: CommandSpec = CommandSpec {
    command: "camera",
    action: "camera_capture",
    arg_key: "path",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "undo",
        action: "undo",
        arg_key: "",
    },
    CommandSpec {
        command: "redo",
        action: "redo",
        arg_key: "",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
        arg_key: "",
    },
    CommandSpec {
        command: "history",
        action: "history",
        arg_key: "",
    },
    CommandSpec {
        command: "status",
        action: "status",
        arg_key: "",
    },
    CommandSpec {
        command: "share",
        action: "share",
        arg_key: "",
    },
    CommandSpec {
        command: "skip",
        action: "skip_onboarding",
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

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/scene",
    "/product",
    "/camera",
    "/undo",
    "/redo",
    "/reset",
    "/history",
    "/status",
    "/download",
    "/share",
    "/layout",
    "/panel",
    "/skip",
    "/model",
    "/help",
    "/quit",
];
