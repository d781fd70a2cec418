use crate::record::{Fingerprint, PrimitiveRecord};

/// Destination topic resolution strategy (§4.5 setup-per-flush step 2).
#[derive(Debug, Clone)]
pub enum TopicResolution {
    /// Fixed topic name, resolved once per flush.
    Static(String),
    /// Contains `$`-placeholders, resolved per record from its fingerprint.
    Dynamic(String),
    /// Cycles through a fixed list, advancing a per-host counter.
    RoundRobin(Vec<String>),
}

impl TopicResolution {
    /// Classifies a configured `sql_table` value per §4.5 step 2: `$` makes it
    /// dynamic; an explicit round-robin list takes precedence over a plain name.
    pub fn classify(template: &str, round_robin_topics: Option<Vec<String>>) -> Self {
        if template.contains('$') {
            Self::Dynamic(template.to_string())
        } else if let Some(topics) = round_robin_topics {
            Self::RoundRobin(topics)
        } else {
            Self::Static(template.to_string())
        }
    }

    /// Startup-incompatibility check (§6): dynamic topics cannot batch or
    /// round-robin. `round_robin_topics` is the raw configured list (not just
    /// what `classify` chose to do with it), since a dynamic `$`-template
    /// takes precedence in `classify` but the round-robin list supplied
    /// alongside it is still a fatal combination, not something to discard.
    pub fn validate(&self, multi_values: usize, round_robin_topics: Option<&[String]>) -> Result<(), &'static str> {
        match self {
            Self::Dynamic(_) if multi_values > 0 => {
                Err("dynamic topic is incompatible with multi-values batching")
            }
            Self::Dynamic(_) if round_robin_topics.is_some_and(|topics| !topics.is_empty()) => {
                Err("dynamic topic is incompatible with round-robin topics")
            }
            _ => Ok(()),
        }
    }
}

/// Per-flush cursor that resolves the destination topic for each record.
pub struct TopicResolver {
    resolution: TopicResolution,
    round_robin_index: usize,
}

impl TopicResolver {
    pub fn new(resolution: TopicResolution) -> Self {
        Self {
            resolution,
            round_robin_index: 0,
        }
    }

    /// Resolves the topic for `record`, advancing round-robin state as a side effect.
    pub fn resolve(&mut self, record: &PrimitiveRecord) -> String {
        match &self.resolution {
            TopicResolution::Static(name) => name.clone(),
            TopicResolution::Dynamic(template) => substitute(template, record),
            TopicResolution::RoundRobin(topics) => {
                let topic = topics[self.round_robin_index % topics.len()].clone();
                self.round_robin_index += 1;
                topic
            }
        }
    }
}

/// Substitutes every `$name` placeholder in `template` from `record`'s fields.
/// Unknown placeholders are left verbatim.
fn substitute(template: &str, record: &PrimitiveRecord) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        match Fingerprint::field(record, &name) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(&name);
            }
        }
    }
    out
}
