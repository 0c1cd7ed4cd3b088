use eframe::egui;
use egui::{CornerRadius, RichText, ScrollArea, Stroke, Ui};
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::{self, Session};
use crate::books_client::{CatalogClient, FavoritesClient, PageSource, ShelfSource};
use crate::config::Config;
use crate::db::{CacheStore, Database, FAVORITES_NAMESPACE, SEARCH_NAMESPACE};
use crate::error::Result;
use crate::models::{BookSummary, FavoriteStatus, PageResponse};
use crate::pagination::{Completion, FetchTicket, PageRequest, PaginationController};
use crate::text::{clean_description, truncate};
use crate::theme::AppTheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTarget {
    Search,
    Favorites,
}

#[derive(Debug, Clone, PartialEq)]
enum View {
    Search,
    Details(BookSummary),
    Favorites,
    SignIn,
}

// Results sent back from worker threads
enum WorkerMessage {
    Page {
        target: ListTarget,
        ticket: FetchTicket,
        result: Result<PageResponse>,
    },
    Favorite {
        book_id: String,
        added: bool,
        result: Result<()>,
    },
    SignedIn(Result<Session>),
    Volume(Result<BookSummary>),
}

// Collected while drawing, applied once the frame's borrows are released
enum UiAction {
    Search,
    ChangePage(ListTarget, usize, usize),
    ShowDetails(BookSummary),
    Back,
    ShowSearch,
    ShowFavorites,
    ShowSignIn,
    AddFavorite(BookSummary),
    RemoveFavorite(BookSummary),
    ReloadVolume(String),
    OpenLink(String),
    CopyLink(String),
    StartSignIn,
    CompleteSignIn,
    UseToken,
    SignOut,
    RefreshFavorites,
    ClearSearchCache,
    ToggleTheme,
}

struct PagerView {
    offset: usize,
    page_size: usize,
    page_index: usize,
    page_count: usize,
    total: usize,
    last_offset: usize,
}

impl PagerView {
    fn of<S: CacheStore>(pager: &PaginationController<S>) -> Self {
        Self {
            offset: pager.offset(),
            page_size: pager.page_size(),
            page_index: pager.page_index(),
            page_count: pager.page_count(),
            total: pager.total_count(),
            last_offset: pager.last_offset(),
        }
    }
}

/// Shelf pages are only kept while a session is stored alongside them.
fn restore_favorites(database: Database, config: &Config, signed_in: bool) -> PaginationController<Database> {
    let mut favorites = PaginationController::restore(
        FAVORITES_NAMESPACE,
        database,
        config.page_size,
        config.max_cached_pages,
    );
    if !signed_in && !favorites.cached_offsets().is_empty() {
        info!("dropping favorites cached for a session that is gone");
        favorites.clear();
    }
    favorites
}

pub struct BookAtlasApp {
    config: Config,
    database: Database,
    catalog: CatalogClient,
    favorites_client: FavoritesClient,
    oauth_http: Client,
    search: PaginationController<Database>,
    favorites: PaginationController<Database>,
    favorite_status: HashMap<String, FavoriteStatus>,
    session: Option<Session>,
    view: View,
    previous_view: View,
    search_input: String,
    sign_in_code: String,
    token_input: String,
    sign_in_pending: bool,
    sign_in_error: Option<String>,
    oauth_state: String,
    notice: Option<(String, bool)>,
    volume_loading: bool,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    pub(crate) theme: AppTheme,
    pub(crate) is_dark_mode: bool,
}

impl BookAtlasApp {
    pub fn new(config: Config, database: Database) -> Result<Self> {
        let catalog = CatalogClient::new(&config)?;
        let favorites_client = FavoritesClient::new(&config)?;
        let oauth_http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let search = PaginationController::restore(
            SEARCH_NAMESPACE,
            database.clone(),
            config.page_size,
            config.max_cached_pages,
        );
        let session = database.load_session();
        if let Some(session) = &session {
            if session.is_expired(chrono::Utc::now()) {
                info!("stored session has expired, shelf requests will ask to sign in again");
            }
        }
        let favorites = restore_favorites(database.clone(), &config, session.is_some());
        let search_input = search.query().to_string();
        let (tx, rx) = mpsc::channel();

        if config.api_key.is_none() {
            warn!("no catalog API key configured, searches use the anonymous quota");
        }

        Ok(Self {
            config,
            database,
            catalog,
            favorites_client,
            oauth_http,
            search,
            favorites,
            favorite_status: HashMap::new(),
            session,
            view: View::Search,
            previous_view: View::Search,
            search_input,
            sign_in_code: String::new(),
            token_input: String::new(),
            sign_in_pending: false,
            sign_in_error: None,
            oauth_state: String::new(),
            notice: None,
            volume_loading: false,
            tx,
            rx,
            theme: AppTheme::dark(),
            is_dark_mode: true,
        })
    }

    fn session_token(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.bearer().to_string())
            .unwrap_or_default()
    }

    fn navigate(&mut self, view: View) {
        if self.view != view {
            self.previous_view = std::mem::replace(&mut self.view, view);
        }
    }

    fn spawn_fetch(&self, target: ListTarget, ticket: FetchTicket, ctx: &egui::Context) {
        let source: Box<dyn PageSource + Send> = match target {
            ListTarget::Search => Box::new(self.catalog.clone()),
            ListTarget::Favorites => Box::new(ShelfSource {
                client: self.favorites_client.clone(),
                token: self.session_token(),
            }),
        };
        let tx = self.tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = source.fetch_page(&ticket.query, ticket.offset, ticket.page_size);
            let _ = tx.send(WorkerMessage::Page { target, ticket, result });
            ctx.request_repaint();
        });
    }

    fn run_search(&mut self, ctx: &egui::Context) {
        let query = self.search_input.trim().to_string();
        if query.is_empty() {
            return;
        }
        info!(%query, "searching");
        self.notice = None;
        let ticket = self.search.begin_search(&query);
        self.spawn_fetch(ListTarget::Search, ticket, ctx);
        self.navigate(View::Search);
    }

    fn change_page(&mut self, target: ListTarget, offset: usize, page_size: usize, ctx: &egui::Context) {
        let request = match target {
            ListTarget::Search => self.search.begin_page_change(offset, page_size),
            ListTarget::Favorites => self.favorites.begin_page_change(offset, page_size),
        };
        if let PageRequest::Fetch(ticket) = request {
            self.spawn_fetch(target, ticket, ctx);
        }
    }

    fn open_favorites(&mut self, ctx: &egui::Context) {
        self.navigate(View::Favorites);
        if self.session.is_some() && !self.favorites.is_loading() {
            let (offset, page_size) = (self.favorites.offset(), self.favorites.page_size());
            self.change_page(ListTarget::Favorites, offset, page_size, ctx);
        }
    }

    fn update_favorite(&mut self, book: &BookSummary, add: bool, ctx: &egui::Context) {
        if self.session.is_none() {
            self.notice = Some(("Sign in to manage favorites".to_string(), true));
            self.navigate(View::SignIn);
            return;
        }
        if let Some(session) = &self.session {
            if session.is_expired(chrono::Utc::now()) {
                warn!("session token has expired, sending it anyway");
            }
        }

        self.favorite_status
            .insert(book.id.clone(), FavoriteStatus::Pending);

        let client = self.favorites_client.clone();
        let token = self.session_token();
        let book_id = book.id.clone();
        let tx = self.tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = if add {
                client.add_to_favorites(&book_id, &token)
            } else {
                client.remove_from_favorites(&book_id, &token)
            };
            let _ = tx.send(WorkerMessage::Favorite {
                book_id,
                added: add,
                result,
            });
            ctx.request_repaint();
        });
    }

    fn reload_volume(&mut self, id: &str, ctx: &egui::Context) {
        if self.volume_loading {
            return;
        }
        self.volume_loading = true;
        let client = self.catalog.clone();
        let id = id.to_string();
        let tx = self.tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = client.fetch_volume(&id);
            let _ = tx.send(WorkerMessage::Volume(result));
            ctx.request_repaint();
        });
    }

    fn start_sign_in(&mut self) {
        self.oauth_state = format!(
            "{:x}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let url = self.config.oauth.authorization_url(&self.oauth_state);
        self.open_link(&url);
    }

    fn complete_sign_in(&mut self, ctx: &egui::Context) {
        if self.sign_in_pending {
            return;
        }
        self.sign_in_pending = true;
        self.sign_in_error = None;

        let code = match auth::code_from_redirect(&self.sign_in_code, &self.oauth_state) {
            Ok(code) => code,
            Err(e) => {
                self.sign_in_pending = false;
                self.sign_in_error = Some(e.to_string());
                return;
            }
        };
        self.sign_in_code.clear();

        let http = self.oauth_http.clone();
        let oauth = self.config.oauth.clone();
        let tx = self.tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = auth::exchange_code(&http, &oauth, &code);
            let _ = tx.send(WorkerMessage::SignedIn(result));
            ctx.request_repaint();
        });
    }

    fn sign_in(&mut self, session: Session) {
        // a different token may be a different account
        let replaced = self
            .session
            .as_ref()
            .is_some_and(|previous| previous.bearer() != session.bearer());
        if replaced {
            self.favorites.clear();
            self.favorite_status.clear();
        }
        if let Err(e) = self.database.save_session(&session) {
            warn!(error = %e, "failed to store session, sign-in lasts until exit");
        }
        self.session = Some(session);
    }

    fn sign_out(&mut self) {
        self.favorites.clear();
        self.favorite_status.clear();
        self.session = None;
        if let Err(e) = self.database.clear_session() {
            warn!(error = %e, "failed to forget stored session");
        }
    }

    fn open_link(&self, url: &str) {
        if let Err(e) = open::that(url) {
            error!("Failed to open URL: {}", e);
        }
    }

    fn copy_link(&mut self, link: &str) {
        let copied = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(link.to_string()));
        match copied {
            Ok(()) => self.notice = Some(("Link copied to clipboard".to_string(), false)),
            Err(e) => {
                warn!("Failed to copy link: {}", e);
                self.notice = Some(("Could not access the clipboard".to_string(), true));
            }
        }
    }

    fn toggle_theme(&mut self) {
        self.is_dark_mode = !self.is_dark_mode;
        self.theme = AppTheme::for_mode(self.is_dark_mode);
    }

    fn check_workers(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                WorkerMessage::Page { target, ticket, result } => {
                    let auth_failed = matches!(&result, Err(e) if e.is_auth());
                    let completion = match target {
                        ListTarget::Search => self.search.complete(ticket, result),
                        ListTarget::Favorites => self.favorites.complete(ticket, result),
                    };
                    if completion == Completion::Failed && auth_failed {
                        self.notice = Some(("Your session has expired, please sign in again".to_string(), true));
                    }
                }
                WorkerMessage::Favorite { book_id, added, result } => {
                    match &result {
                        Ok(()) => {
                            info!(%book_id, added, "favorites updated");
                            // the shelf listing no longer matches the remote
                            self.favorites.clear();
                        }
                        Err(e) => {
                            warn!(%book_id, error = %e, "could not update favorites");
                            if e.is_auth() {
                                self.notice = Some(("Your session has expired, please sign in again".to_string(), true));
                            }
                        }
                    }
                    let status = FavoriteStatus::after_update(added, &result);
                    self.favorite_status.insert(book_id, status);
                }
                WorkerMessage::SignedIn(result) => {
                    self.sign_in_pending = false;
                    match result {
                        Ok(session) => {
                            self.sign_in(session);
                            self.notice = Some(("Signed in".to_string(), false));
                            self.view = View::Search;
                        }
                        Err(e) => {
                            warn!(error = %e, "sign-in failed");
                            self.sign_in_error = Some(e.to_string());
                        }
                    }
                }
                WorkerMessage::Volume(result) => {
                    self.volume_loading = false;
                    match result {
                        Ok(book) => {
                            if let View::Details(current) = &mut self.view {
                                if current.id == book.id {
                                    *current = book;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "could not reload volume"),
                    }
                }
            }
        }
    }

    fn apply(&mut self, action: UiAction, ctx: &egui::Context) {
        match action {
            UiAction::Search => self.run_search(ctx),
            UiAction::ChangePage(target, offset, page_size) => self.change_page(target, offset, page_size, ctx),
            UiAction::ShowDetails(book) => self.navigate(View::Details(book)),
            UiAction::Back => {
                let previous = std::mem::replace(&mut self.previous_view, View::Search);
                self.view = previous;
            }
            UiAction::ShowSearch => self.navigate(View::Search),
            UiAction::ShowFavorites => self.open_favorites(ctx),
            UiAction::ShowSignIn => self.navigate(View::SignIn),
            UiAction::AddFavorite(book) => self.update_favorite(&book, true, ctx),
            UiAction::RemoveFavorite(book) => self.update_favorite(&book, false, ctx),
            UiAction::ReloadVolume(id) => self.reload_volume(&id, ctx),
            UiAction::OpenLink(url) => self.open_link(&url),
            UiAction::CopyLink(url) => self.copy_link(&url),
            UiAction::StartSignIn => self.start_sign_in(),
            UiAction::CompleteSignIn => self.complete_sign_in(ctx),
            UiAction::UseToken => match Session::from_access_token(&self.token_input) {
                Some(session) => {
                    self.token_input.clear();
                    self.sign_in(session);
                    self.notice = Some(("Signed in with access token".to_string(), false));
                    self.view = View::Search;
                }
                None => self.sign_in_error = Some("Paste an access token first".to_string()),
            },
            UiAction::SignOut => {
                self.sign_out();
                self.notice = Some(("Signed out".to_string(), false));
                if self.view == View::Favorites {
                    self.view = View::Search;
                }
            }
            UiAction::RefreshFavorites => {
                self.favorites.clear();
                let page_size = self.favorites.page_size();
                self.change_page(ListTarget::Favorites, 0, page_size, ctx);
            }
            UiAction::ClearSearchCache => {
                self.search.clear();
                if let Err(e) = self.database.clear(SEARCH_NAMESPACE) {
                    warn!(error = %e, "failed to clear stored search cache");
                }
                self.search_input.clear();
            }
            UiAction::ToggleTheme => self.toggle_theme(),
        }
    }

    fn icon_button(&self, ui: &mut Ui, label: &str, active: bool) -> egui::Response {
        let response = ui.add(
            egui::Button::new(
                RichText::new(label)
                    .color(if active { self.theme.highlight } else { self.theme.button_foreground })
                    .size(16.0),
            )
            .min_size(egui::Vec2::new(32.0, 30.0))
            .corner_radius(CornerRadius::same(6))
            .fill(self.theme.button_background),
        );
        if response.hovered() {
            ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
        }
        response
    }

    fn render_header(&mut self, ui: &mut Ui, actions: &mut Vec<UiAction>) {
        ui.horizontal(|ui| {
            let title = ui.add(
                egui::Label::new(
                    RichText::new("BookAtlas")
                        .color(self.theme.highlight)
                        .size(24.0)
                        .strong(),
                )
                .sense(egui::Sense::click()),
            );
            if title.clicked() {
                actions.push(UiAction::ShowSearch);
            }

            ui.add_space(20.0);

            let search_field = ui.add(
                egui::TextEdit::singleline(&mut self.search_input)
                    .hint_text("Search by title...")
                    .desired_width(320.0),
            );
            if search_field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                actions.push(UiAction::Search);
            }
            if self.icon_button(ui, "🔍", false).on_hover_text("Search").clicked() {
                actions.push(UiAction::Search);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let theme_icon = if self.is_dark_mode { "☀" } else { "☾" };
                if self
                    .icon_button(ui, theme_icon, false)
                    .on_hover_text(if self.is_dark_mode { "Switch to Light Mode" } else { "Switch to Dark Mode" })
                    .clicked()
                {
                    actions.push(UiAction::ToggleTheme);
                }

                ui.add_space(8.0);
                if self.session.is_some() {
                    if self.icon_button(ui, "Sign out", false).clicked() {
                        actions.push(UiAction::SignOut);
                    }
                } else if self
                    .icon_button(ui, "Sign in", self.view == View::SignIn)
                    .clicked()
                {
                    actions.push(UiAction::ShowSignIn);
                }

                ui.add_space(8.0);
                if self
                    .icon_button(ui, "♥ Favorites", self.view == View::Favorites)
                    .clicked()
                {
                    actions.push(UiAction::ShowFavorites);
                }
            });
        });

        if let Some((message, is_error)) = &self.notice {
            ui.add_space(4.0);
            ui.label(
                RichText::new(message)
                    .color(if *is_error { self.theme.error } else { self.theme.success })
                    .size(14.0),
            );
        }
    }

    fn render_empty_state(&self, ui: &mut Ui, icon: &str, message: &str, detail: Option<&str>) {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() * 0.3);
            ui.label(RichText::new(icon).size(48.0).color(self.theme.highlight));
            ui.add_space(12.0);
            ui.label(RichText::new(message).color(self.theme.secondary_text).size(18.0));
            if let Some(detail) = detail {
                ui.add_space(6.0);
                ui.label(RichText::new(detail).color(self.theme.secondary_text).size(13.0).italics());
            }
        });
    }

    fn render_loading(&self, ui: &mut Ui, message: &str) {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() * 0.3);
            ui.spinner();
            ui.add_space(8.0);
            ui.label(RichText::new(message).color(self.theme.secondary_text));
        });
    }

    fn render_book_table(&self, ui: &mut Ui, books: &[BookSummary], first_row: usize, actions: &mut Vec<UiAction>) {
        egui::Frame::new()
            .fill(self.theme.card_background)
            .corner_radius(CornerRadius::same(8))
            .stroke(Stroke::new(1.0, self.theme.separator))
            .inner_margin(egui::Margin::same(12))
            .show(ui, |ui| {
                egui::Grid::new("book_table")
                    .num_columns(4)
                    .striped(true)
                    .spacing([16.0, 10.0])
                    .min_col_width(40.0)
                    .show(ui, |ui| {
                        ui.label(RichText::new("#").color(self.theme.secondary_text).strong());
                        ui.label(RichText::new("Cover").color(self.theme.secondary_text).strong());
                        ui.label(RichText::new("Book Title").color(self.theme.secondary_text).strong());
                        ui.label(RichText::new("Published").color(self.theme.secondary_text).strong());
                        ui.end_row();

                        for (i, book) in books.iter().enumerate() {
                            ui.label(
                                RichText::new(format!("{}", first_row + i + 1))
                                    .color(self.theme.secondary_text),
                            );

                            let cover = if book.thumbnail_url.is_some() { "🖼" } else { "📖" };
                            ui.label(RichText::new(cover).size(22.0));

                            ui.vertical(|ui| {
                                let title = ui.add(
                                    egui::Label::new(
                                        RichText::new(truncate(&book.title, 90))
                                            .color(self.theme.text)
                                            .size(15.0)
                                            .strong(),
                                    )
                                    .sense(egui::Sense::click()),
                                );
                                if title.hovered() {
                                    ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
                                }
                                if title.clicked() {
                                    actions.push(UiAction::ShowDetails(book.clone()));
                                }
                                ui.label(
                                    RichText::new(book.authors_line())
                                        .color(self.theme.secondary_text)
                                        .size(13.0),
                                );
                            });

                            ui.label(
                                RichText::new(book.published_date.as_deref().unwrap_or("—"))
                                    .color(self.theme.secondary_text),
                            );
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_paginator(&self, ui: &mut Ui, target: ListTarget, pager: PagerView, actions: &mut Vec<UiAction>) {
        let PagerView {
            offset,
            page_size,
            page_index,
            page_count,
            total,
            last_offset,
        } = pager;

        ui.horizontal(|ui| {
            let has_prev = offset > 0;
            let has_next = page_index + 1 < page_count;

            if ui.add_enabled(has_prev, egui::Button::new("⏮")).clicked() {
                actions.push(UiAction::ChangePage(target, 0, page_size));
            }
            if ui.add_enabled(has_prev, egui::Button::new("⬅")).clicked() {
                actions.push(UiAction::ChangePage(target, offset.saturating_sub(page_size), page_size));
            }

            // a window of five page links around the current page
            let first = page_index.saturating_sub(2);
            let last = (first + 5).min(page_count);
            for index in first..last {
                let label = RichText::new(format!("{}", index + 1)).color(if index == page_index {
                    self.theme.highlight
                } else {
                    self.theme.text
                });
                if ui.selectable_label(index == page_index, label).clicked() {
                    actions.push(UiAction::ChangePage(target, index * page_size, page_size));
                }
            }

            if ui.add_enabled(has_next, egui::Button::new("➡")).clicked() {
                actions.push(UiAction::ChangePage(target, offset + page_size, page_size));
            }
            if ui.add_enabled(has_next, egui::Button::new("⏭")).clicked() {
                actions.push(UiAction::ChangePage(target, last_offset, page_size));
            }

            ui.add_space(16.0);
            let mut selected = page_size;
            egui::ComboBox::from_id_salt(("rows_per_page", target as u8))
                .selected_text(format!("{} per page", page_size))
                .show_ui(ui, |ui| {
                    for option in &self.config.page_size_options {
                        ui.selectable_value(&mut selected, *option, format!("{}", option));
                    }
                });
            if selected != page_size {
                // rows change keeps the first visible record in view
                let new_offset = (offset / selected) * selected;
                actions.push(UiAction::ChangePage(target, new_offset, selected));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    RichText::new(format!("{} results", total))
                        .color(self.theme.secondary_text)
                        .size(13.0),
                );
            });
        });
    }

    fn render_search_view(&self, ui: &mut Ui, actions: &mut Vec<UiAction>) {
        if self.search.is_loading() {
            self.render_loading(ui, "Searching...");
            return;
        }
        if self.search.items().is_empty() {
            // a failed page change keeps the total, so paging stays possible
            if self.search.total_count() > 0 {
                self.render_paginator(ui, ListTarget::Search, PagerView::of(&self.search), actions);
                self.render_empty_state(
                    ui,
                    "⚠",
                    "This page could not be loaded",
                    Some("Pick the page again to retry, or move to another one."),
                );
                return;
            }
            if self.search.query().is_empty() {
                self.render_empty_state(ui, "🔍", "Start searching using the search bar above", None);
            } else {
                let message = format!("No books found for '{}'", self.search.query());
                let detail = self.search.last_error().map(|_| "The catalog could not be reached. Try again in a moment.");
                self.render_empty_state(ui, "🔍", &message, detail);
            }
            return;
        }

        ui.horizontal(|ui| {
            ui.label(
                RichText::new(format!("Results for '{}'", self.search.query()))
                    .color(self.theme.text)
                    .size(18.0),
            );
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .small_button("Clear cache")
                    .on_hover_text("Forget cached result pages")
                    .clicked()
                {
                    actions.push(UiAction::ClearSearchCache);
                }
            });
        });
        ui.add_space(8.0);

        ScrollArea::vertical()
            .id_salt("search_results")
            .auto_shrink([false, false])
            .max_height((ui.available_height() - 40.0).max(120.0))
            .show(ui, |ui| {
                self.render_book_table(ui, self.search.items(), self.search.offset(), actions);
            });
        ui.add_space(8.0);
        self.render_paginator(ui, ListTarget::Search, PagerView::of(&self.search), actions);
    }

    fn render_details_view(&self, ui: &mut Ui, book: &BookSummary, actions: &mut Vec<UiAction>) {
        let status = self.favorite_status.get(&book.id).copied().unwrap_or_default();

        ui.horizontal(|ui| {
            if ui.button("⬅ Back").clicked() {
                actions.push(UiAction::Back);
            }
            if ui
                .add_enabled(!self.volume_loading, egui::Button::new("↻ Reload"))
                .clicked()
            {
                actions.push(UiAction::ReloadVolume(book.id.clone()));
            }
            if self.volume_loading {
                ui.spinner();
            }
        });
        ui.add_space(8.0);

        ScrollArea::vertical()
            .id_salt("details_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                egui::Frame::new()
                    .fill(self.theme.card_background)
                    .corner_radius(CornerRadius::same(8))
                    .stroke(Stroke::new(1.0, self.theme.separator))
                    .inner_margin(egui::Margin::same(20))
                    .show(ui, |ui| {
                        ui.heading(RichText::new(&book.title).color(self.theme.highlight).size(26.0));
                        ui.label(
                            RichText::new(format!("By: {}", book.authors_line()))
                                .color(self.theme.accent)
                                .size(16.0),
                        );
                        ui.add_space(12.0);

                        let field = |ui: &mut Ui, name: &str, value: String| {
                            ui.horizontal(|ui| {
                                ui.label(RichText::new(name).strong().color(self.theme.text));
                                ui.label(RichText::new(value).color(self.theme.secondary_text));
                            });
                        };
                        field(ui, "Publisher:", book.publisher.clone().unwrap_or_else(|| "—".into()));
                        field(ui, "Published Date:", book.published_date.clone().unwrap_or_else(|| "—".into()));
                        field(
                            ui,
                            "Page Count:",
                            book.page_count.map(|n| n.to_string()).unwrap_or_else(|| "—".into()),
                        );

                        ui.add_space(12.0);
                        ui.label(RichText::new("Description").strong().color(self.theme.text));
                        let description = book
                            .description
                            .as_deref()
                            .map(clean_description)
                            .filter(|d| !d.is_empty())
                            .unwrap_or_else(|| "No description available".to_string());
                        ui.label(RichText::new(description).color(self.theme.secondary_text));

                        ui.add_space(16.0);
                        ui.horizontal(|ui| {
                            let label = if status.is_favorited() { "♥ In favorites" } else { "♡ Add to favorites" };
                            if ui
                                .add_enabled(status.can_add(), egui::Button::new(label))
                                .clicked()
                            {
                                actions.push(UiAction::AddFavorite(book.clone()));
                            }
                            match status {
                                FavoriteStatus::Pending => {
                                    ui.spinner();
                                }
                                FavoriteStatus::Failed => {
                                    ui.label(
                                        RichText::new("Could not update favorites, try again")
                                            .color(self.theme.error),
                                    );
                                }
                                _ => {}
                            }

                            if status.is_favorited() || self.previous_view == View::Favorites {
                                if ui
                                    .add_enabled(status != FavoriteStatus::Pending, egui::Button::new("Remove"))
                                    .clicked()
                                {
                                    actions.push(UiAction::RemoveFavorite(book.clone()));
                                }
                            }

                            ui.add_space(12.0);
                            if ui.button("Open in browser").clicked() {
                                actions.push(UiAction::OpenLink(book.link()));
                            }
                            if ui.button("Copy link").clicked() {
                                actions.push(UiAction::CopyLink(book.link()));
                            }
                        });
                    });
            });
    }

    fn render_favorites_view(&self, ui: &mut Ui, actions: &mut Vec<UiAction>) {
        ui.horizontal(|ui| {
            ui.heading(RichText::new("Favorites").color(self.theme.highlight).size(22.0));
            if self.session.is_some() {
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("↻ Refresh").clicked() {
                        actions.push(UiAction::RefreshFavorites);
                    }
                });
            }
        });
        ui.add_space(8.0);

        let Some(session) = &self.session else {
            self.render_empty_state(ui, "🔒", "Sign in to see your favorite books", None);
            ui.vertical_centered(|ui| {
                if ui.button("Sign in").clicked() {
                    actions.push(UiAction::ShowSignIn);
                }
            });
            return;
        };

        if let Some(minutes) = session.minutes_left(chrono::Utc::now()) {
            ui.label(
                RichText::new(format!("Session expires in {} min", minutes))
                    .color(self.theme.secondary_text)
                    .size(12.0),
            );
        }

        if self.favorites.is_loading() {
            self.render_loading(ui, "Loading favorites...");
            return;
        }
        if self.favorites.items().is_empty() {
            if self.favorites.total_count() > 0 {
                self.render_paginator(ui, ListTarget::Favorites, PagerView::of(&self.favorites), actions);
            }
            self.render_empty_state(ui, "♥", "No favorite books found.", self.favorites.last_error());
            return;
        }

        ScrollArea::vertical()
            .id_salt("favorites_results")
            .auto_shrink([false, false])
            .max_height((ui.available_height() - 40.0).max(120.0))
            .show(ui, |ui| {
                self.render_book_table(ui, self.favorites.items(), self.favorites.offset(), actions);
            });
        ui.add_space(8.0);
        self.render_paginator(ui, ListTarget::Favorites, PagerView::of(&self.favorites), actions);
    }

    fn render_sign_in_view(&mut self, ui: &mut Ui, actions: &mut Vec<UiAction>) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            egui::Frame::new()
                .fill(self.theme.card_background)
                .corner_radius(CornerRadius::same(8))
                .stroke(Stroke::new(1.0, self.theme.separator))
                .inner_margin(egui::Margin::same(24))
                .show(ui, |ui| {
                    ui.set_max_width(420.0);
                    ui.heading(RichText::new("Sign in").color(self.theme.highlight));
                    ui.add_space(12.0);

                    let configured = self.config.oauth.is_configured();
                    if ui
                        .add_enabled(configured, egui::Button::new("Sign in with Google"))
                        .clicked()
                    {
                        actions.push(UiAction::StartSignIn);
                    }
                    if !configured {
                        ui.label(
                            RichText::new("Set GOOGLE_CLIENT_ID to enable Google sign-in")
                                .color(self.theme.secondary_text)
                                .size(12.0)
                                .italics(),
                        );
                    }

                    ui.add_space(8.0);
                    ui.label("Paste the authorization code or the redirect URL from the browser:");
                    ui.add(egui::TextEdit::singleline(&mut self.sign_in_code).desired_width(360.0));
                    ui.horizontal(|ui| {
                        let ready = !self.sign_in_code.trim().is_empty() && !self.sign_in_pending;
                        if ui.add_enabled(ready, egui::Button::new("Complete sign-in")).clicked() {
                            actions.push(UiAction::CompleteSignIn);
                        }
                        if self.sign_in_pending {
                            ui.spinner();
                        }
                    });

                    ui.add_space(8.0);
                    ui.separator();
                    ui.label("Or use an existing access token:");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.token_input)
                            .password(true)
                            .desired_width(360.0),
                    );
                    if ui.button("Use token").clicked() {
                        actions.push(UiAction::UseToken);
                    }

                    if let Some(err) = &self.sign_in_error {
                        ui.add_space(8.0);
                        ui.label(RichText::new(err).color(self.theme.error));
                    }
                });
        });
    }
}

impl eframe::App for BookAtlasApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        storage.set_string("is_dark_mode", self.is_dark_mode.to_string());
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.theme.apply_to_ctx(ctx);
        self.check_workers();

        let mut actions = Vec::new();

        if let View::Details(_) = &self.view {
            if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
                actions.push(UiAction::Back);
            }
        }

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::new().fill(self.theme.background).inner_margin(egui::Margin::same(10)))
            .show(ctx, |ui| {
                self.render_header(ui, &mut actions);
            });

        egui::CentralPanel::default().show(ctx, |ui| match self.view.clone() {
            View::Search => self.render_search_view(ui, &mut actions),
            View::Details(book) => self.render_details_view(ui, &book, &mut actions),
            View::Favorites => self.render_favorites_view(ui, &mut actions),
            View::SignIn => self.render_sign_in_view(ui, &mut actions),
        });

        for action in actions {
            self.apply(action, ctx);
        }

        // keep the spinner turning while workers run
        if self.search.is_loading() || self.favorites.is_loading() || self.sign_in_pending || self.volume_loading {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_cache::{CacheSnapshot, CachedPage};

    fn store_shelf(db: &Database) {
        let book = BookSummary {
            id: "shelved".into(),
            title: "Children of Time".into(),
            authors: vec!["Adrian Tchaikovsky".into()],
            publisher: None,
            published_date: None,
            page_count: None,
            description: None,
            thumbnail_url: None,
            info_link: None,
        };
        let snapshot = CacheSnapshot {
            query: String::new(),
            page_size: 5,
            total_count: 1,
            pages: vec![CachedPage {
                offset: 0,
                items: vec![book],
            }],
            current_offset: 0,
        };
        db.save(FAVORITES_NAMESPACE, &snapshot).unwrap();
    }

    #[test]
    fn stored_shelf_is_served_when_the_session_was_kept() {
        let db = Database::in_memory().unwrap();
        store_shelf(&db);

        let favorites = restore_favorites(db, &Config::default(), true);
        assert_eq!(favorites.items().len(), 1);
        assert_eq!(favorites.total_count(), 1);
        assert_eq!(favorites.items()[0].id, "shelved");
    }

    #[test]
    fn stored_shelf_without_a_session_is_dropped() {
        let db = Database::in_memory().unwrap();
        store_shelf(&db);

        let favorites = restore_favorites(db.clone(), &Config::default(), false);
        assert!(favorites.items().is_empty());
        assert!(db.load(FAVORITES_NAMESPACE).unwrap().pages.is_empty());
    }
}
