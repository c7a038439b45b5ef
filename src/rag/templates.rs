//! Per-language instruction templates for the generative model.
//!
//! Selection is a lookup into a table keyed by [`Language`]; the only
//! dynamic parts are the retrieved context, the question and the optional
//! citation clause.

use super::language::Language;

struct LanguageTemplates {
    chat: &'static str,
    notes: &'static str,
    citation: &'static str,
    summary_query: &'static str,
}

const ENGLISH: LanguageTemplates = LanguageTemplates {
    chat: r#"
Based only on the following course content, answer the question.

Course content (multilingual):
{context}

Question: {question}

Instructions:
- Answer in clear, concise English
- Use information from all languages in the context
- If answer not in content, say "I don't find that information in the course material"
- Do not invent information that is not present in the content
- Cite sources when possible (timestamp, slide/page number)
- Use an educational and friendly tone

Answer:
"#,
    notes: r#"
Generate structured course notes in English based on the following content:

{context}

Required format:
# Course Title

## 1. Key Concepts
- List main concepts
- Brief explanation of each

## 2. Important Formulas/Algorithms
- Present key formulas or algorithms
- Explain variables and complexity

## 3. Examples
- Include examples from lecture
- Show step-by-step solutions

## 4. Summary
- Key takeaways
- Important points to remember

IMPORTANT:
- Write in formal academic English
- Use correct technical terminology
- Only include information from provided content
- Do not invent data not present{citation}
"#,
    citation: "\n- Cite sources with [Source: Video HH:MM:SS, Slide N]",
    summary_query: "Summarize all key concepts, formulas, and examples from this course",
};

const SPANISH: LanguageTemplates = LanguageTemplates {
    chat: r#"
Basándote únicamente en el siguiente contenido del curso, responde la pregunta.

Contenido del curso (multilingüe):
{context}

Pregunta: {question}

Instrucciones:
- Responde en español claro y conciso
- Usa información de todos los idiomas en el contexto
- Si la respuesta no está en el contenido, di "No encuentro esa información en el material del curso"
- No inventes información que no esté en el contenido
- Cita fuentes cuando sea posible (timestamp, número de diapositiva/página)
- Usa un tono educativo y amigable

Respuesta:
"#,
    notes: r#"
Genera apuntes estructurados en español basados en el siguiente contenido:

{context}

Formato requerido:
# Título del Curso

## 1. Conceptos Clave
- Lista de conceptos principales
- Explicación breve de cada uno

## 2. Fórmulas/Algoritmos Importantes
- Presenta fórmulas o algoritmos clave
- Explica variables y complejidad

## 3. Ejemplos
- Incluye ejemplos de la clase
- Muestra soluciones paso a paso

## 4. Resumen
- Puntos clave para recordar
- Conceptos importantes

IMPORTANTE:
- Escribe en español académico formal
- Usa terminología técnica correcta
- Solo incluye información del contenido proporcionado
- No inventes datos que no estén presentes{citation}
"#,
    citation: "\n- Cita fuentes con [Fuente: Video HH:MM:SS, Diapositiva N]",
    summary_query: "Resume todos los conceptos clave, fórmulas y ejemplos de este curso",
};

const CATALAN: LanguageTemplates = LanguageTemplates {
    chat: r#"
Basant-te únicament en el següent contingut del curs, respon la pregunta.

Contingut del curs (multilingüe):
{context}

Pregunta: {question}

Instruccions:
- Respon en català clar i concís
- Utilitza informació de tots els idiomes del context
- Si la resposta no està al contingut, digues "No trobo aquesta informació al material del curs"
- No inventis informació que no sigui al contingut
- Cita fonts quan sigui possible (timestamp, número de diapositiva/pàgina)
- Utilitza un to educatiu i amigable

Resposta:
"#,
    notes: r#"
Genera apunts estructurats en català basats en el següent contingut:

{context}

Format requerit:
# Títol del Curs

## 1. Conceptes Clau
- Llista de conceptes principals
- Explicació breu de cadascun

## 2. Fórmules/Algorismes Importants
- Presenta fórmules o algorismes clau
- Explica variables i complexitat

## 3. Exemples
- Inclou exemples de la classe
- Mostra solucions pas a pas

## 4. Resum
- Punts clau per recordar
- Conceptes importants

IMPORTANT:
- Escriu en català acadèmic formal
- Utilitza terminologia tècnica correcta
- Només inclou informació del contingut proporcionat
- No inventis dades que no siguin presents{citation}
"#,
    citation: "\n- Cita fonts amb [Font: Vídeo HH:MM:SS, Diapositiva N]",
    summary_query: "Resumeix tots els conceptes clau, fórmules i exemples d'aquest curs",
};

fn table(language: Language) -> &'static LanguageTemplates {
    match language {
        Language::En => &ENGLISH,
        Language::Es => &SPANISH,
        Language::Ca => &CATALAN,
    }
}

// Placeholders are substituted in a single left-to-right pass so text inside
// `context` or `question` that happens to contain `{...}` is never expanded.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    'outer: while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        for (key, value) in values {
            if let Some(after) = tail[1..].strip_prefix(key).and_then(|s| s.strip_prefix('}')) {
                out.push_str(value);
                rest = after;
                continue 'outer;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

pub fn build_chat_prompt(language: Language, context: &str, question: &str) -> String {
    render(table(language).chat, &[("context", context), ("question", question)])
}

pub fn build_notes_prompt(language: Language, context: &str, include_sources: bool) -> String {
    let t = table(language);
    let citation = if include_sources { t.citation } else { "" };
    render(t.notes, &[("context", context), ("citation", citation)])
}

/// Query text used to pull broad course content when generating notes.
pub fn summary_query(language: Language) -> &'static str {
    table(language).summary_query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_inserts_context_and_question() {
        let prompt = build_chat_prompt(Language::En, "A stack is LIFO.", "What is a stack?");
        assert!(prompt.contains("A stack is LIFO."));
        assert!(prompt.contains("Question: What is a stack?"));
        assert!(prompt.contains("Answer in clear, concise English"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn test_each_language_has_its_own_chat_template() {
        assert!(build_chat_prompt(Language::Es, "c", "q").contains("Responde en español"));
        assert!(build_chat_prompt(Language::Ca, "c", "q").contains("Respon en català"));
    }

    #[test]
    fn test_notes_sections_in_order() {
        for language in Language::ALL {
            let prompt = build_notes_prompt(language, "ctx", false);
            let positions: Vec<usize> = ["## 1.", "## 2.", "## 3.", "## 4."]
                .iter()
                .map(|h| prompt.find(h).expect("section header"))
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{language}");
            assert!(prompt.starts_with('\n'));
            assert!(prompt.contains("\n# "));
        }
    }

    #[test]
    fn test_citation_clause_is_conditional() {
        let without = build_notes_prompt(Language::En, "ctx", false);
        let with = build_notes_prompt(Language::En, "ctx", true);
        assert!(!without.contains("Cite sources"));
        let clause = "- Do not invent data not present\n- Cite sources with [Source: Video HH:MM:SS, Slide N]";
        assert!(with.contains(clause));
        assert!(build_notes_prompt(Language::Ca, "ctx", true).contains("[Font: Vídeo HH:MM:SS, Diapositiva N]"));
        assert!(!build_notes_prompt(Language::Es, "ctx", false).contains("Cita fuentes"));
    }

    #[test]
    fn test_braces_in_user_text_are_not_expanded() {
        let prompt = build_chat_prompt(Language::En, "fn main() { {question} }", "{context}?");
        assert!(prompt.contains("fn main() { {question} }"));
        assert!(prompt.contains("Question: {context}?"));
    }

    #[test]
    fn test_summary_queries_are_localized() {
        assert!(summary_query(Language::En).starts_with("Summarize"));
        assert!(summary_query(Language::Es).starts_with("Resume"));
        assert!(summary_query(Language::Ca).starts_with("Resumeix"));
    }
}
