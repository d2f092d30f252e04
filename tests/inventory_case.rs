use tinplate::{parse, render, Context};

const INVENTORY: &str = "
{{name}}'s inventory:
{{ for (title, copies) in inventory }}
 * {{if copies > 1}}{{ copies }} copies of{{else}}A single copy of{{endif}} {{title}}
{{ endfor }}
";

#[test]
fn inventory_listing() {
    let ctx = Context::new().with("name", "btoth").with(
        "inventory",
        vec![("Orwell's 1984", 2), ("the Lord of the Rings", 1)],
    );
    let rendered = render(INVENTORY, &ctx).unwrap();
    let expected = concat!(
        "btoth's inventory:\n",
        " * 2 copies of Orwell's 1984\n",
        " * A single copy of the Lord of the Rings",
    );
    assert_eq!(rendered, expected);
}

#[test]
fn inventory_from_json_context() {
    let ctx = Context::from_json(
        r#"{"name": "ann", "inventory": [["Dune", 3]]}"#,
    )
    .unwrap();
    let rendered = render(INVENTORY, &ctx).unwrap();
    assert_eq!(rendered, "ann's inventory:\n * 3 copies of Dune");
}

#[test]
fn empty_inventory_keeps_only_the_heading() {
    let template = parse(INVENTORY).unwrap();
    let ctx = Context::new()
        .with("name", "nobody")
        .with("inventory", Vec::<(String, i64)>::new());
    assert_eq!(template.render(&ctx).unwrap(), "nobody's inventory:");
}

#[test]
fn inventory_with_custom_delimiters() {
    let template = tinplate::TemplateParser::new()
        .with_delimiters("[[", "]]")
        .parse("[[for (title, copies) in inventory]][[title]]x[[copies]] [[endfor]]{{kept}}")
        .unwrap();
    let ctx = Context::new().with("inventory", vec![("a", 1), ("b", 2)]);
    assert_eq!(template.render(&ctx).unwrap(), "ax1 bx2 {{kept}}");
}
