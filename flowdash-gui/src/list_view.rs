use crate::app::Message;
use flowdash_core::{
    FetchTicket, ListItem, ListPhase, ListSource, LocalQuery, NavTarget, PageNav, PageToken,
    PagedListController, RawListResponse, ResourceKind, ResourceSource,
};
use iced::widget::{Row, button, column, pick_list, row, scrollable, text};
use iced::{Element, Length, Task};
use serde::de::DeserializeOwned;
use std::fmt;

/// Toolbar and pager interactions shared by every list.
#[derive(Debug, Clone)]
pub enum ListEvent {
    Navigate(NavTarget),
    PageSizeSelected(usize),
    SearchChanged(String),
    Refresh,
}

/// One list screen: its controller, where it loads from, and the search box text.
pub struct ListView<T> {
    pub list: PagedListController<T>,
    source: ResourceSource<T>,
    pub search: String,
}

impl<T> ListView<T>
where
    T: ListItem + LocalQuery + DeserializeOwned + Clone + fmt::Debug + Send + 'static,
{
    pub fn new(source: ResourceSource<T>, list: PagedListController<T>) -> Self {
        Self {
            list,
            source,
            search: String::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.source.kind()
    }

    /// Applies a toolbar or pager event. A ticket means a fetch must follow.
    pub fn handle(&mut self, event: ListEvent) -> Option<FetchTicket> {
        match event {
            ListEvent::Navigate(target) => {
                let page = self.list.nav().target(target)?;
                self.list.set_page(page)
            }
            ListEvent::PageSizeSelected(size) => self.list.set_page_size(size),
            ListEvent::SearchChanged(term) => {
                self.search = term.clone();
                Some(self.list.set_filter("q", Some(term)))
            }
            ListEvent::Refresh => Some(self.list.refetch()),
        }
    }

    /// First fetch when the view is shown for the first time.
    pub fn ensure_loaded(&mut self) -> Option<FetchTicket> {
        (self.list.phase() == &ListPhase::Idle).then(|| self.list.refetch())
    }

    pub fn fetch<F>(&self, ticket: FetchTicket, on_done: F) -> Task<Message>
    where
        F: Fn(FetchTicket, Result<RawListResponse<T>, String>) -> Message + Send + 'static,
    {
        let source = self.source.clone();
        Task::perform(
            async move {
                let outcome = source
                    .fetch(&ticket.request)
                    .await
                    .map_err(|e| e.to_string());
                (ticket, outcome)
            },
            move |(ticket, outcome)| on_done(ticket, outcome),
        )
    }

    pub fn fetch_maybe<F>(&self, ticket: Option<FetchTicket>, on_done: F) -> Task<Message>
    where
        F: Fn(FetchTicket, Result<RawListResponse<T>, String>) -> Message + Send + 'static,
    {
        match ticket {
            Some(ticket) => self.fetch(ticket, on_done),
            None => Task::none(),
        }
    }
}

/// Rows, or the loading / failed / empty placeholder. Rows get their index on
/// the loaded page.
pub fn list_body<'a, T>(
    list: &'a PagedListController<T>,
    empty_label: &'a str,
    render_row: impl Fn(usize, &'a T) -> Element<'a, Message>,
) -> Element<'a, Message> {
    match list.phase() {
        ListPhase::Loading => text("Loading…").size(16).into(),
        ListPhase::Failed(message) => text(format!("Failed to load: {}", message))
            .size(16)
            .color(iced::Color::from_rgb(0.8, 0.1, 0.1))
            .into(),
        _ if list.items().is_empty() => text(empty_label).size(16).into(),
        _ => scrollable(
            column(
                list.items()
                    .iter()
                    .enumerate()
                    .map(|(index, item)| render_row(index, item)),
            )
            .spacing(6),
        )
            .height(Length::Fill)
            .into(),
    }
}

/// `« ‹ 1 … 4 5 6 … 10 › »` with the current page and the ends disabled as needed.
pub fn nav_bar<'a, F>(nav: &PageNav, on_navigate: F) -> Element<'a, Message>
where
    F: Fn(NavTarget) -> Message,
{
    let mut bar: Row<'a, Message> = row![].spacing(4);

    bar = bar
        .push(
            button("«")
                .on_press_maybe(nav.first_enabled().then(|| on_navigate(NavTarget::First)))
                .padding(5),
        )
        .push(
            button("‹")
                .on_press_maybe(nav.prev_enabled().then(|| on_navigate(NavTarget::Prev)))
                .padding(5),
        );

    for token in &nav.tokens {
        bar = match *token {
            PageToken::Page(page) if page == nav.current_page => {
                bar.push(button(text(format!("[{}]", page))).padding(5))
            }
            PageToken::Page(page) => bar.push(
                button(text(page.to_string()))
                    .on_press(on_navigate(NavTarget::Page(page)))
                    .padding(5),
            ),
            PageToken::Ellipsis => bar.push(text(PageToken::Ellipsis.to_string()).size(14)),
        };
    }

    bar = bar
        .push(
            button("›")
                .on_press_maybe(nav.next_enabled().then(|| on_navigate(NavTarget::Next)))
                .padding(5),
        )
        .push(
            button("»")
                .on_press_maybe(nav.last_enabled().then(|| on_navigate(NavTarget::Last)))
                .padding(5),
        )
        .push(text(nav.status_text()).size(14));

    bar.into()
}

pub fn page_size_picker<'a, F>(options: &[usize], current: usize, on_select: F) -> Element<'a, Message>
where
    F: Fn(usize) -> Message + 'a,
{
    row![
        text("Rows per page:").size(14),
        pick_list(options.to_vec(), Some(current), on_select).width(Length::Fixed(80.0)),
    ]
    .spacing(8)
    .into()
}

/// Pager, total and page-size picker under a list.
pub fn list_footer<'a, T, F>(
    list: &PagedListController<T>,
    page_size_options: &[usize],
    on_event: F,
) -> Element<'a, Message>
where
    F: Fn(ListEvent) -> Message + Clone + 'a,
{
    let on_navigate = on_event.clone();
    let on_size = on_event;
    row![
        nav_bar(&list.nav(), move |target| on_navigate(ListEvent::Navigate(target))),
        text(format!("{} total", list.total_count())).size(14),
        page_size_picker(page_size_options, list.page_size(), move |size| {
            on_size(ListEvent::PageSizeSelected(size))
        }),
    ]
    .spacing(20)
    .into()
}
