#![allow(dead_code)]

use std::collections::VecDeque;

use crux_core::testing::AppTester;
use crux_core::Request;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use crux_kv::KeyValueOperation;
use shared::durable_store::{execute, KeyValueStore, MemoryStore};
use shared::{App, Effect, Event, GuideConfig, Model, ViewModel};

/// The core plus a shell that answers storage effects from `store`.
pub struct Guide<S = MemoryStore> {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub store: S,
}

impl<S: KeyValueStore> Guide<S> {
    pub fn new(config: GuideConfig, store: S) -> Self {
        Self {
            app: AppTester::default(),
            model: Model::with_config(config),
            store,
        }
    }

    pub fn boot(config: GuideConfig, store: S) -> Self {
        let mut guide = Self::new(config, store);
        guide.send(Event::AppStarted);
        guide
    }

    /// Effects of `event` without touching the store.
    pub fn update(&mut self, event: Event) -> Vec<Effect> {
        self.app.update(event, &mut self.model).effects
    }

    /// Sends `event`, runs every storage effect it leads to, and returns the
    /// effects left for the rest of the shell.
    pub fn send(&mut self, event: Event) -> Vec<Effect> {
        let effects = self.update(event);
        self.settle(effects)
    }

    pub fn settle(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut rest = Vec::new();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::KeyValue(mut request) => {
                    let output = execute(&mut self.store, &request.operation);
                    let update = self
                        .app
                        .resolve(&mut request, output)
                        .expect("kv request resolves");
                    for event in update.events {
                        queue.extend(self.update(event));
                    }
                }
                other => rest.push(other),
            }
        }
        rest
    }

    pub fn respond(
        &mut self,
        mut request: Request<HttpRequest>,
        response: HttpResponse,
    ) -> Vec<Effect> {
        let update = self
            .app
            .resolve(&mut request, HttpResult::Ok(response))
            .expect("http request resolves");
        let mut rest = Vec::new();
        for event in update.events {
            rest.extend(self.send(event));
        }
        rest
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }
}

pub fn http_requests(effects: Vec<Effect>) -> Vec<Request<HttpRequest>> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Http(request) => Some(request),
            _ => None,
        })
        .collect()
}

pub fn kv_requests(effects: Vec<Effect>) -> Vec<Request<KeyValueOperation>> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::KeyValue(request) => Some(request),
            _ => None,
        })
        .collect()
}

pub fn ok(body: &str) -> HttpResponse {
    HttpResponse::ok().body(body.as_bytes().to_vec()).build()
}

pub fn status(code: u16) -> HttpResponse {
    HttpResponse::status(code).build()
}

pub fn candidate(name: &str, lat: f64, lon: f64) -> String {
    format!(r#"[{{"display_name":"{name}","lat":"{lat}","lon":"{lon}"}}]"#)
}
