use colored::Colorize;

pub struct Theme {
    pub user_style: Box<dyn Fn(String) -> String>,
    pub cwd_style: Box<dyn Fn(String) -> String>,
    pub error_style: Box<dyn Fn(String) -> String>,
    pub exit_message: String,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            user_style: Box::new(|s| s.bright_green().bold().to_string()),
            cwd_style: Box::new(|s| s.bright_blue().to_string()),
            error_style: Box::new(|s| s.bright_red().to_string()),
            exit_message: "bye, see you next session".bright_magenta().to_string(),
        }
    }
}

impl Theme {
    pub fn plain() -> Self {
        Theme {
            user_style: Box::new(|s| s),
            cwd_style: Box::new(|s| s),
            error_style: Box::new(|s| s),
            exit_message: String::from("bye"),
        }
    }

    pub fn load_theme(theme_name: &str) -> Theme {
        match theme_name {
            "plain" => Theme::plain(),
            _ => Theme::default(),
        }
    }

    /// `<user>@<host>:<cwd> <shell>$ `
    pub fn prompt(&self, user: &str, host: &str, cwd: &str, shell: &str) -> String {
        format!(
            "{}:{} {}$ ",
            (self.user_style)(format!("{}@{}", user, host)),
            (self.cwd_style)(cwd.to_string()),
            shell
        )
    }
}
