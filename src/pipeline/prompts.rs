use crate::tables::RewriteTables;

/// Replaces every `{{key}}` in `template`.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub const GOLDEN_SYSTEM_TEXT: &str =
    "Sei un autore di script YouTube in italiano. Rispondi solo con JSON valido.";

pub const GOLDEN_PROMPT_TEXT: &str = r#"Scrivi uno script YouTube in italiano, utile e concreto.

INPUT
- Topic: {{topic}}
- Audience: {{audience}}
- Type: {{type}}
- Durata: {{minutes}} minuti
- Range parole finale target: {{min_words}}-{{max_words}}

PROFILO AUDIENCE
- Focus lessicale: {{focus}}
- Stile: {{style}}
- Direzione: {{direction}}
- Parole obbligatorie audience (usa tutte almeno una volta): {{mandatory}}
- Parole vietate audience (non usare): {{forbidden}}

PATTERN TYPE
- {{pattern}}
- {{tag}}

TOPIC ANCHORS (OBBLIGATORIO)
- Anchor terms estratti dal topic: {{anchors}}
- Ogni blocco deve usare almeno 1 anchor, ruotandoli senza liste ripetitive.

REGOLE FISSE
- Niente hook o CTA: li aggiunge il sistema.
- Niente opener vietati e nessuna frase fissa riusata da altri topic.
- Nessuna tripletta di parole uguale oltre 2 occorrenze.
- Inserisci esattamente 2 cue open-loop con payoff successivo: uno con "più avanti" nel blocco 2 o 3, uno con "alla fine" nel blocco 5 o 6.
- Inserisci almeno 2 micro-casi coerenti con audience e type.
- Usa dettagli concreti: minuti, ritmo, segnali del corpo, esempi reali.
- Non iniziare più blocchi con la stessa formula.
- Frasi vietate assolute: {{banned}}

OUTPUT OBBLIGATORIO
Restituisci SOLO JSON valido:
{"blocks":["...", "..."]}
- Esattamente {{segments}} blocchi, ognuno di almeno {{block_min_words}} parole.
- Nessun testo fuori dal JSON."#;

/// Inputs of [`golden_prompt`].
#[derive(Clone, Debug)]
pub struct PromptInputs<'a> {
    pub topic: &'a str,
    pub audience: &'a str,
    pub script_type: &'a str,
    pub minutes: u32,
    pub min_words: usize,
    pub max_words: usize,
    pub segments: usize,
    pub block_min_words: usize,
    pub anchors: &'a [String],
}

/// The generation prompt: request, audience profile, type pattern, anchors and the JSON
/// output contract.
#[must_use]
pub fn golden_prompt(tables: &RewriteTables, inputs: &PromptInputs<'_>) -> String {
    let profile = tables.audience(inputs.audience);
    let kind = tables.types.get(inputs.script_type);

    let minutes = inputs.minutes.to_string();
    let min_words = inputs.min_words.to_string();
    let max_words = inputs.max_words.to_string();
    let segments = inputs.segments.to_string();
    let block_min = inputs.block_min_words.saturating_sub(10).max(150).to_string();
    let focus = profile.map(|p| p.focus.clone()).unwrap_or_default();
    let style = profile.map(|p| p.style.clone()).unwrap_or_default();
    let direction = profile.map(|p| p.direction.clone()).unwrap_or_default();
    let mandatory = profile.map(|p| p.mandatory.join(", ")).unwrap_or_default();
    let forbidden = profile.map(|p| p.forbidden.join(", ")).unwrap_or_default();
    let pattern = kind.map(|t| t.pattern.clone()).unwrap_or_default();
    let tag = kind.map(|t| t.tag.clone()).unwrap_or_default();
    let anchors = inputs.anchors.join(" | ");
    let banned = tables.script.banned_prompt_phrases.join(" | ");

    render_template(
        GOLDEN_PROMPT_TEXT,
        &[
            ("topic", inputs.topic),
            ("audience", inputs.audience),
            ("type", inputs.script_type),
            ("minutes", &minutes),
            ("min_words", &min_words),
            ("max_words", &max_words),
            ("focus", &focus),
            ("style", &style),
            ("direction", &direction),
            ("mandatory", &mandatory),
            ("forbidden", &forbidden),
            ("pattern", &pattern),
            ("tag", &tag),
            ("anchors", &anchors),
            ("banned", &banned),
            ("segments", &segments),
            ("block_min_words", &block_min),
        ],
    )
}
