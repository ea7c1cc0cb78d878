use okl_core::rewriter::Rewriter;
use okl_core::syntax::{parse, walk, NodeKind, NodeRef, Visitor};
use pretty_assertions::assert_eq;
use std::ops::ControlFlow;

const UNIT: &str = r#"#include "consts.h"
namespace ns {
extern "C" {
[[okl_kernel("")]] void k(const int N, float *a __attribute__((okl_restrict("")))) {
  [[okl_outer("")]] for (int i = 0; i < N; ++i) {
    if (i > 2) a[i] = 0;
  }
}
}
}
"#;

#[derive(Default)]
struct Trace {
    events: Vec<String>,
    stop_at: Option<NodeKind>,
}

impl<'ast> Visitor<'ast> for Trace {
    fn pre(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        self.events.push(format!("+{}", node.kind()));
        if self.stop_at == Some(node.kind()) {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn post(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        self.events.push(format!("-{}", node.kind()));
        ControlFlow::Continue(())
    }
}

#[test]
fn walk_visits_children_between_pre_and_post() {
    let tu = parse(UNIT).expect("parse");
    let mut trace = Trace::default();
    assert_eq!(walk(&tu, &mut trace), ControlFlow::Continue(()));
    assert_eq!(
        trace.events.join(" "),
        "+TranslationUnit +Directive -Directive +Namespace +Namespace \
         +Function +Param -Param +Param -Param +Compound +For +Compound \
         +If +Expr -Expr -If -Compound -For -Compound -Function \
         -Namespace -Namespace -TranslationUnit"
    );
}

#[test]
fn break_stops_the_walk() {
    let tu = parse(UNIT).expect("parse");
    let mut trace = Trace {
        stop_at: Some(NodeKind::For),
        ..Trace::default()
    };
    assert_eq!(walk(&tu, &mut trace), ControlFlow::Break(()));
    assert_eq!(trace.events.last().map(String::as_str), Some("+For"));
    let closed: Vec<&str> = trace
        .events
        .iter()
        .map(String::as_str)
        .filter(|e| e.starts_with('-'))
        .collect();
    assert_eq!(closed, ["-Directive", "-Param", "-Param"]);
}

struct Strip<'a> {
    rewriter: Rewriter<'a>,
}

impl<'ast> Visitor<'ast> for Strip<'_> {
    fn pre(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        for attr in node.attrs().iter().filter(|attr| attr.is_okl()) {
            self.rewriter.remove(attr.removal_span);
        }
        ControlFlow::Continue(())
    }
}

#[test]
fn removing_every_attribute_leaves_plain_cxx() {
    let tu = parse(UNIT).expect("parse");
    let mut strip = Strip {
        rewriter: Rewriter::new(UNIT),
    };
    let _ = walk(&tu, &mut strip);
    let text = strip.rewriter.apply().expect("apply");
    assert!(!text.contains("okl_"), "{text}");
    assert!(text.starts_with("#include \"consts.h\"\n"));

    let reparsed = parse(&text).expect("reparse");
    let mut check = Strip {
        rewriter: Rewriter::new(&text),
    };
    let _ = walk(&reparsed, &mut check);
    assert!(check.rewriter.is_empty());
}
