use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till, take_while1};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, pair, separated_pair, terminated, tuple};
use nom::IResult;

use common::err::scaling_error::ReError;
use common::err::CResult;

/// 一个表达式最多展开出的数据节点数
pub const MAX_EXPANDED_NODES: u128 = 100_000;

/// 行表达式片段
#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Literal(String),
    Values(Values),
}

/// 占位符的取值。区间在展开前不物化
#[derive(Debug, Clone, PartialEq)]
enum Values {
    /// 闭区间，start > end 时倒序
    Range(i64, i64),
    List(Vec<String>),
}

impl Values {
    fn len(&self) -> u128 {
        match self {
            Values::Range(start, end) => (*start as i128 - *end as i128).unsigned_abs() + 1,
            Values::List(values) => values.len() as u128,
        }
    }

    fn to_vec(&self) -> Vec<String> {
        match self {
            Values::Range(start, end) if start <= end => (*start..=*end).map(|i| i.to_string()).collect(),
            Values::Range(start, end) => (*end..=*start).rev().map(|i| i.to_string()).collect(),
            Values::List(values) => values.clone(),
        }
    }
}

/// 展开行表达式。
///
/// 支持 `${a..b}` 闭区间与 `${['x', 'y']}` 枚举两种占位符，顶层逗号分隔多个表达式。
/// 多个占位符按笛卡尔积展开，左侧占位符变化最慢：
///
/// ```text
/// ds_${0..1}.t_order_${0..1}
///   => ds_0.t_order_0, ds_0.t_order_1, ds_1.t_order_0, ds_1.t_order_1
/// ```
pub fn expand(expression: &str) -> CResult<Vec<String>> {
    let segments = match all_consuming(parse_expression)(expression.trim()) {
        Ok((_, segments)) => segments,
        Err(e) => {
            return Err(ReError::ConfigurationError(format!("invalid inline expression `{}`: {}", expression, e)));
        }
    };

    // 先计算展开规模，超限时拒绝，不分配任何节点
    let total = segments
        .iter()
        .map(|segment| {
            segment.iter().fold(1u128, |acc, fragment| match fragment {
                Fragment::Literal(_) => acc,
                Fragment::Values(values) => acc.saturating_mul(values.len()),
            })
        })
        .fold(0u128, |acc, n| acc.saturating_add(n));
    if total > MAX_EXPANDED_NODES {
        return Err(ReError::ConfigurationError(format!(
            "inline expression `{}` expands to {} data nodes, more than {}", expression, total, MAX_EXPANDED_NODES)));
    }

    let mut result = Vec::new();
    for segment in segments {
        let mut expanded = vec![String::new()];
        for fragment in segment {
            expanded = match fragment {
                Fragment::Literal(s) => expanded.into_iter().map(|prefix| prefix + &s).collect(),
                Fragment::Values(values) => {
                    let values = values.to_vec();
                    expanded
                        .iter()
                        .flat_map(|prefix| values.iter().map(move |v| format!("{}{}", prefix, v)))
                        .collect()
                }
            };
        }
        result.extend(expanded.into_iter().map(|s| s.trim().to_string()));
    }

    Ok(result)
}

/// 将 `数据源.表` 拆分为两部分，以第一个 `.` 为界
pub fn split_data_node(node: &str) -> CResult<(String, String)> {
    match node.trim().split_once('.') {
        Some((ds, table)) if !ds.is_empty() && !table.is_empty() => Ok((ds.to_string(), table.to_string())),
        _ => Err(ReError::ConfigurationError(format!(
            "invalid data node `{}`, expected <dataSource>.<table>", node))),
    }
}

fn parse_expression(input: &str) -> IResult<&str, Vec<Vec<Fragment>>> {
    separated_list1(tuple((multispace0, char(','), multispace0)), parse_segment)(input)
}

fn parse_segment(input: &str) -> IResult<&str, Vec<Fragment>> {
    many1(alt((placeholder, literal, lone_dollar)))(input)
}

fn literal(input: &str) -> IResult<&str, Fragment> {
    map(is_not("$,"), |s: &str| Fragment::Literal(s.to_string()))(input)
}

// 不接 `{` 的 `$` 按普通字符处理
fn lone_dollar(input: &str) -> IResult<&str, Fragment> {
    map(terminated(char('$'), not(char('{'))), |_| Fragment::Literal("$".to_string()))(input)
}

fn placeholder(input: &str) -> IResult<&str, Fragment> {
    map(
        delimited(pair(tag("${"), multispace0), alt((range, list)), pair(multispace0, char('}'))),
        Fragment::Values,
    )(input)
}

fn number(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

/// `a..b`，包含两端。a > b 时倒序
fn range(input: &str) -> IResult<&str, Values> {
    map(
        separated_pair(number, tuple((multispace0, tag(".."), multispace0)), number),
        |(start, end)| Values::Range(start, end),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
    ))(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-')(input)
}

fn list(input: &str) -> IResult<&str, Values> {
    map(
        delimited(
            pair(char('['), multispace0),
            separated_list1(tuple((multispace0, char(','), multispace0)), map(alt((quoted, bare)), String::from)),
            pair(multispace0, char(']')),
        ),
        Values::List,
    )(input)
}
