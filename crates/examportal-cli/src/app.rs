//! Command handlers. Each public method is one CLI command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use examportal_core::api::{ApiClient, LoginRequest};
use examportal_core::applications::{self, ApplyOutcome};
use examportal_core::assistant::{self, AssistantError, ChatSession};
use examportal_core::auth::{open_backend, AuthState};
use examportal_core::balance::CreditBalance;
use examportal_core::cache::CacheManager;
use examportal_core::dashboard::{self, ProfileDashboard};
use examportal_core::guard::{GuardDecision, RouteGuard};
use examportal_core::models::paper;
use examportal_core::models::{Application, Exam, ExamFilter, PaperFilter};
use examportal_core::notifications::{NewNotification, Notification, NotificationCenter, NotificationKind};
use examportal_core::registration::{RegistrationForm, RegistrationWizard, Step};
use examportal_core::settings::ContactForm;
use examportal_core::utils::{format_credit, format_date, format_optional, is_valid_email, truncate_string};
use examportal_core::{Config, EventBus, SessionState};

use crate::prompt;

/// Saved notification list, in the data directory
const NOTIFICATIONS_FILE: &str = "notifications.json";

/// Width of the message column in the notification list
const MESSAGE_WIDTH: usize = 72;

pub struct App {
    config: Config,
    session: SessionState,
    bus: EventBus,
    cache: Option<CacheManager>,
    data_dir: PathBuf,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let api = ApiClient::new(config.api_base_url())?;
        let backend = open_backend(config.storage_kind(), &data_dir);
        let session = SessionState::open(api, backend, config.session_options());

        let cache = match config.cache_dir().and_then(CacheManager::new) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Cache unavailable");
                None
            }
        };

        Ok(Self {
            config,
            session,
            bus: EventBus::new(),
            cache,
            data_dir,
        })
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub fn status(&self) -> Result<()> {
        match self.session.state() {
            AuthState::Authenticated(user) => {
                println!("Logged in as {} <{}>", user.name, user.email);
                println!("  Id:       {}", user.id);
                if !user.phone.is_empty() {
                    println!("  Phone:    {}", user.phone);
                }
                if let Some(ref upsc_id) = user.upsc_id {
                    println!("  UPSC id:  {}", upsc_id);
                }
            }
            AuthState::Unauthenticated => println!("Not logged in"),
            AuthState::Loading => println!("Checking stored credentials..."),
        }
        if let Some(ref cache) = self.cache {
            println!("Exam catalog updated {}", cache.exams_age());
        }
        Ok(())
    }

    pub async fn login(&mut self, email: Option<&str>) -> Result<()> {
        if !self.login_interactive(email).await? {
            anyhow::bail!("Login failed");
        }
        Ok(())
    }

    async fn login_interactive(&mut self, email: Option<&str>) -> Result<bool> {
        println!("\n=== Examination Portal Login ===\n");

        let email = match email {
            Some(email) => email.to_string(),
            None => {
                let last = self.config.last_email.clone().unwrap_or_default();
                prompt::line_with_default("Email", &last)?
            }
        };
        if !is_valid_email(&email) {
            println!("Please enter a valid email address");
            return Ok(false);
        }
        let password = prompt::password("Password")?;

        println!("\nAuthenticating...");
        let credentials = LoginRequest {
            email: email.clone(),
            password,
        };
        if !self.session.login(&credentials).await {
            println!("Login failed. Check your email and password.");
            return Ok(false);
        }

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        println!("Login successful!\n");
        Ok(true)
    }

    pub fn logout(&self) -> Result<()> {
        let user_id = self.session.user().map(|u| u.id);
        self.session.logout();
        if let (Some(cache), Some(id)) = (&self.cache, user_id) {
            if let Err(e) = cache.clear_account(&id) {
                warn!(error = %e, "Failed to clear cached applications");
            }
        }
        println!("Logged out");
        Ok(())
    }

    pub async fn register(&self) -> Result<()> {
        let mut wizard = RegistrationWizard::new();
        loop {
            let step = wizard.step();
            let (current, total) = wizard.progress();
            println!("\n== Step {}/{}: {} ==", current, total, step.title());

            fill_step(wizard.form_mut(), step)?;
            if let Err(missing) = wizard.form().validate_step(step) {
                println!("{}", missing);
                continue;
            }
            if wizard.is_last_step() {
                break;
            }
            wizard.next()?;
        }

        let form = wizard.into_form();
        println!("\nSubmitting registration...");
        if !self.session.register(&form).await {
            anyhow::bail!("Registration failed. Please try again.");
        }
        println!("Registration successful! You can now login to continue.");
        println!("Log in with: examportal login {}", form.email);
        Ok(())
    }

    /// Make sure the user may open `path`, logging in first if needed, and
    /// return a client carrying the token.
    async fn require_login(&mut self, path: &str) -> Result<ApiClient> {
        if let GuardDecision::RedirectToLogin { return_to } =
            RouteGuard::check(path, &self.session.snapshot())
        {
            println!("Please log in to continue.");
            if !self.login_interactive(None).await? {
                anyhow::bail!("Login required");
            }
            debug!(destination = %RouteGuard::after_login(Some(&return_to)), "Resuming after login");
        }
        self.session
            .api()
            .ok_or_else(|| anyhow::anyhow!("Your session has expired. Please log in again."))
    }

    pub async fn open(&mut self, path: &str) -> Result<()> {
        match RouteGuard::check(path, &self.session.snapshot()) {
            GuardDecision::Allow => println!("Opening {}", path),
            GuardDecision::Wait => println!("Still checking your session..."),
            GuardDecision::RedirectToLogin { return_to } => {
                println!("{} requires login.", path);
                if self.login_interactive(None).await? {
                    println!("Opening {}", RouteGuard::after_login(Some(&return_to)));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Exams
    // =========================================================================

    async fn load_exams(&self, refresh: bool) -> Result<Vec<Exam>> {
        if !refresh {
            if let Some(exams) = self.cache.as_ref().and_then(|c| c.fresh_exams()) {
                return Ok(exams);
            }
        }

        match self.session.public_api().fetch_exams().await {
            Ok(exams) => {
                if let Some(ref cache) = self.cache {
                    if let Err(e) = cache.save_exams(&exams) {
                        warn!(error = %e, "Failed to cache exams");
                    }
                }
                Ok(exams)
            }
            Err(e) => {
                // Stale beats nothing
                if let Some(Ok(Some(cached))) = self.cache.as_ref().map(|c| c.load_exams()) {
                    warn!(error = %e, "Using cached exams");
                    println!("(offline - showing exams cached {})", cached.age_display());
                    return Ok(cached.data);
                }
                Err(e).context("Failed to fetch exams")
            }
        }
    }

    pub async fn exams(&self, refresh: bool, filter: &ExamFilter) -> Result<()> {
        let exams = self.load_exams(refresh).await?;
        let shown = filter.apply(&exams);
        if shown.is_empty() {
            println!("No exams listed");
            return Ok(());
        }

        println!("{:>4}  {:<12} {:<22} {:>8}  {}", "ID", "EXAM", "STATUS", "FEE", "DATE");
        for exam in shown {
            println!(
                "{:>4}  {:<12} {:<22} {:>8}  {}",
                exam.id,
                truncate_string(exam.label(), 12),
                truncate_string(&format_optional(&exam.status, "-"), 22),
                exam.fee_display(),
                exam.date.as_deref().map(format_date).unwrap_or_default(),
            );
        }
        Ok(())
    }

    pub fn papers(&self, filter: &PaperFilter) -> Result<()> {
        let papers = paper::catalog();
        let shown = filter.apply(&papers);
        if shown.is_empty() {
            println!("No papers match");
            println!("Exams: {}", paper::exam_names(&papers).join(", "));
            let years: Vec<String> = paper::years(&papers).iter().map(u16::to_string).collect();
            println!("Years: {}", years.join(", "));
            return Ok(());
        }

        println!("{:>3}  {:<20} {:<40} {:<11} {:>5}", "ID", "EXAM", "PAPER", "TYPE", "PAGES");
        for p in shown {
            println!(
                "{:>3}  {:<20} {:<40} {:<11} {:>5}",
                p.id,
                truncate_string(&p.exam, 20),
                truncate_string(&p.display_title(), 40),
                p.kind,
                p.pages,
            );
            println!("     {}", p.download_url);
        }
        Ok(())
    }

    pub async fn apply(&self, exam_id: i64) -> Result<()> {
        let exams = self.load_exams(false).await?;
        let exam = exams
            .iter()
            .find(|e| e.id == exam_id)
            .ok_or_else(|| anyhow::anyhow!("No exam with id {}", exam_id))?;

        match applications::apply(&self.session, &self.bus, exam).await {
            ApplyOutcome::LoginRequired => {
                println!("Please log in to apply: examportal login");
            }
            ApplyOutcome::Submitted { remaining_credit } => {
                println!(
                    "Application Submitted! You have successfully applied for {}. Your remaining credit is {}",
                    exam.label(),
                    remaining_credit.map_or_else(|| "N/A".to_string(), |c| format_credit(Some(c)))
                );
                self.notify(NewNotification {
                    title: format!("{} - Application Submitted", exam.label()),
                    message: format!("Your application for {} has been received.", exam.name),
                    kind: NotificationKind::Success,
                    download_url: None,
                });
            }
            ApplyOutcome::AlreadyApplied(message) => println!("Already Applied: {}", message),
            ApplyOutcome::InsufficientCredit(message) => println!("Insufficient Credits: {}", message),
            ApplyOutcome::ConnectionError(message) => println!("Connection Error: {}", message),
            ApplyOutcome::Failed(message) => println!("Application Failed: {}", message),
        }
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    async fn load_dashboard(&mut self) -> Result<ProfileDashboard> {
        let client = self.require_login("/profile").await?;
        let dashboard = dashboard::load(&client)
            .await
            .context("Failed to load profile data. Please try again.")?;

        if let (Some(cache), Some(user)) = (&self.cache, self.session.user()) {
            if let Err(e) = cache.save_applications(&user.id, &dashboard.applications) {
                warn!(error = %e, "Failed to cache applications");
            }
        }
        Ok(dashboard)
    }

    pub async fn profile(&mut self) -> Result<()> {
        let dashboard = self.load_dashboard().await?;
        let details = &dashboard.details;

        println!("{}", details.display_name());
        println!("  Email:    {}", format_optional(&details.email, "-"));
        println!("  Phone:    {}", details.contact_phone().unwrap_or("-"));
        println!("  Credit:   {}", format_credit(details.credit));
        if let Some(ref address) = details.complete_address {
            println!("  Address:  {}", address);
        }

        println!("\nApplications ({})", dashboard.applications.len());
        for app in &dashboard.applications {
            print_application(app);
        }
        Ok(())
    }

    pub async fn certificate(&mut self, application_id: &str) -> Result<()> {
        let dashboard = self.load_dashboard().await?;
        let application = find_application(&dashboard, application_id)?;
        if application.qualified != Some(true) {
            anyhow::bail!("Certificates are only issued for qualified applications");
        }

        let client = self.require_login("/profile").await?;
        let generated =
            dashboard::generate_certificate(&client, &dashboard.details, application).await?;
        println!("Certificate Generated!");
        if let Some(ref id) = generated.certificate_id {
            println!("  Certificate id: {}", id);
        }
        if let Some(ref url) = generated.ipfs_url {
            println!("  View: {}", url);
        }
        Ok(())
    }

    pub async fn admit_card(&mut self, application_id: &str) -> Result<()> {
        let dashboard = self.load_dashboard().await?;
        let application = find_application(&dashboard, application_id)?;

        let client = self.require_login("/profile").await?;
        let dir = std::env::current_dir()?;
        let path =
            dashboard::download_admit_card(&client, &dashboard.details, application, &dir).await?;
        println!("Admit Card Generated! Saved to {}", path.display());
        Ok(())
    }

    pub async fn credit(&self) -> Result<()> {
        let balance = CreditBalance::new(&self.session);
        balance.refresh().await;
        if self.session.is_authenticated() {
            println!("Credit: {}", balance.display());
        } else {
            println!("Log in to see your credit balance");
        }
        Ok(())
    }

    pub async fn settings(&mut self) -> Result<()> {
        let client = self.require_login("/settings").await?;
        let details = client
            .fetch_user()
            .await
            .context("Failed to load your details")?;

        let current = ContactForm::from_details(&details);
        let form = ContactForm {
            new_email: prompt::line_with_default("Email", &current.new_email)?,
            new_phone: prompt::line_with_default("Phone", &current.new_phone)?,
        };

        let update = match form.validate(&details) {
            Ok(update) => update,
            Err(errors) => {
                for error in errors {
                    println!("{}", error);
                }
                return Ok(());
            }
        };

        match self.session.update_contact(&update).await {
            Ok(message) => println!("Settings Updated! {}", message),
            Err(e) => println!("Update Failed: {}", e.user_message()),
        }
        Ok(())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    fn notifications_path(&self) -> PathBuf {
        self.data_dir.join(NOTIFICATIONS_FILE)
    }

    fn load_notifications(&self) -> NotificationCenter {
        let path = self.notifications_path();
        let saved = std::fs::read_to_string(&path)
            .ok()
            .and_then(|json| match serde_json::from_str::<Vec<Notification>>(&json) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!(error = %e, "Saved notifications unreadable, starting over");
                    None
                }
            });
        match saved {
            Some(list) => NotificationCenter::from_notifications(list),
            None => NotificationCenter::seeded(),
        }
    }

    fn save_notifications(&self, center: &NotificationCenter) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(center.all())?;
        std::fs::write(self.notifications_path(), json)?;
        Ok(())
    }

    fn notify(&self, notification: NewNotification) {
        let mut center = self.load_notifications();
        center.add(notification);
        if let Err(e) = self.save_notifications(&center) {
            warn!(error = %e, "Failed to save notifications");
        }
    }

    pub fn notifications(&self, args: &[String]) -> Result<()> {
        let mut center = self.load_notifications();

        match args.first().map(String::as_str) {
            Some("read") => {
                let id = args
                    .get(1)
                    .ok_or_else(|| anyhow::anyhow!("Missing argument: <id>"))?;
                if !center.mark_as_read(id) {
                    anyhow::bail!("No notification with id {}", id);
                }
                self.save_notifications(&center)?;
            }
            Some("read-all") => {
                center.mark_all_as_read();
                self.save_notifications(&center)?;
            }
            Some(other) => anyhow::bail!("Unknown notifications action: {}", other),
            None => {}
        }

        println!("Notifications ({} unread)\n", center.unread_count());
        for n in center.all() {
            let marker = if n.read { " " } else { "*" };
            println!("{} [{}] {}  {}", marker, n.id, format_date(&n.date), n.title);
            println!("      {}", truncate_string(&n.message, MESSAGE_WIDTH));
            if let Some(ref url) = n.download_url {
                println!("      Download: {}{}", self.config.api_base_url(), url);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Assistant
    // =========================================================================

    pub async fn ask(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            anyhow::bail!("Missing argument: <message>");
        }
        let reply = assistant::ask(self.session.public_api(), message).await;
        println!("{}", reply);
        Ok(())
    }

    pub async fn assistant(&mut self) -> Result<()> {
        self.require_login("/ai-study-assistance").await?;
        let mut chat = ChatSession::new(self.session.clone());
        println!("Study assistant ready. An empty line ends the conversation.\n");

        loop {
            let message = prompt::line("You")?;
            if message.is_empty() || message == "exit" {
                break;
            }
            match chat.send(&message).await {
                Ok(reply) => println!("Assistant: {}\n", reply),
                Err(e @ (AssistantError::NotLoggedIn | AssistantError::SessionExpired)) => {
                    println!("{}", e);
                    break;
                }
                Err(e) => println!("{}\n", e),
            }
        }
        Ok(())
    }
}

fn find_application<'a>(dashboard: &'a ProfileDashboard, id: &str) -> Result<&'a Application> {
    dashboard
        .application(id)
        .ok_or_else(|| anyhow::anyhow!("No application with id {}", id))
}

fn print_application(app: &Application) {
    println!(
        "  [{}] {}  {}  applied {}",
        app.id,
        app.exam_name,
        app.status_display(),
        app.application_date.as_deref().map(format_date).unwrap_or_else(|| "-".to_string()),
    );
    if let Some(rank) = app.rank {
        println!("      Rank: {}", rank);
    }
    if let Some(ref certificate) = app.certificate {
        println!(
            "      Certificate: {}",
            certificate.ipfs_url.as_deref().unwrap_or("verified")
        );
    } else if app.has_certificate() {
        println!("      Certificate: not yet verified");
    }
    if app.admit_card_available == Some(true) {
        println!("      Admit card available: examportal admit-card {}", app.id);
    }
}

/// Prompt for the fields of one wizard step, offering what is already filled.
fn fill_step(form: &mut RegistrationForm, step: Step) -> Result<()> {
    fn ask(label: &str, value: &mut String) -> Result<()> {
        *value = prompt::line_with_default(label, value)?;
        Ok(())
    }

    match step {
        Step::Personal => {
            ask("Full name", &mut form.name)?;
            ask("Father's name", &mut form.father_name)?;
            ask("Mother's name (optional)", &mut form.mother_name)?;
            ask("Date of birth (YYYY-MM-DD)", &mut form.date_of_birth)?;
            ask("Gender", &mut form.gender)?;
            ask("Category", &mut form.category)?;
            ask("Nationality", &mut form.nationality)?;
        }
        Step::Contact => {
            ask("Email", &mut form.email)?;
            ask("Phone", &mut form.phone)?;
            ask("Alternate phone (optional)", &mut form.alternate_phone)?;
        }
        Step::Address => {
            ask("Address", &mut form.address)?;
            ask("City", &mut form.city)?;
            ask("District (optional)", &mut form.district)?;
            ask("State", &mut form.state)?;
            ask("Pincode", &mut form.pincode)?;
        }
        Step::Education => {
            ask("Highest qualification", &mut form.qualification)?;
            ask("University", &mut form.university)?;
            ask("Passing year", &mut form.passing_year)?;
            ask("Percentage (optional)", &mut form.percentage)?;
        }
        Step::Account => {
            form.password = prompt::password("Password")?;
            form.confirm_password = prompt::password("Confirm password")?;
            form.agree_terms = prompt::confirm("I agree to the terms and conditions", false)?;
            form.agree_privacy = prompt::confirm("I agree to the privacy policy", false)?;
        }
    }
    Ok(())
}
